use std::cell::RefCell;
use std::sync::RwLock;

use crate::dtype::DType;

// Config — process-wide defaults for the type layer
//
// The only setting today is the default float dtype ("floatX"): the dtype
// used by the dtype-less TensorType constructors (scalar/vector/matrix).
// Tests frequently need to pin it, so a thread-local scoped override is
// provided alongside the global setter; the override restores the previous
// state on exit and nests correctly.

static FLOAT_X: RwLock<DType> = RwLock::new(DType::F64);

thread_local! {
    static FLOAT_X_OVERRIDE: RefCell<Option<DType>> = const { RefCell::new(None) };
}

/// The default float dtype used when a constructor takes no dtype.
pub fn float_x() -> DType {
    if let Some(d) = FLOAT_X_OVERRIDE.with(|o| *o.borrow()) {
        return d;
    }
    *FLOAT_X.read().unwrap_or_else(|e| e.into_inner())
}

/// Set the process-wide default float dtype.
pub fn set_float_x(dtype: DType) {
    *FLOAT_X.write().unwrap_or_else(|e| e.into_inner()) = dtype;
}

/// Run a closure with the default float dtype overridden on this thread.
/// The previous value (including any enclosing override) is restored when
/// the closure returns.
pub fn with_float_x<T>(dtype: DType, f: impl FnOnce() -> T) -> T {
    let prev = FLOAT_X_OVERRIDE.with(|o| o.borrow_mut().replace(dtype));
    let result = f();
    FLOAT_X_OVERRIDE.with(|o| *o.borrow_mut() = prev);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_float_x_scoped() {
        let base = float_x();
        let seen = with_float_x(DType::F32, float_x);
        assert_eq!(seen, DType::F32);
        assert_eq!(float_x(), base);
    }

    #[test]
    fn test_with_float_x_nests() {
        with_float_x(DType::F32, || {
            assert_eq!(float_x(), DType::F32);
            with_float_x(DType::F16, || assert_eq!(float_x(), DType::F16));
            assert_eq!(float_x(), DType::F32);
        });
    }
}
