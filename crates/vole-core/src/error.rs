use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within Vole's type layer.
///
/// This enum captures every failure mode of value filtering and type
/// reconciliation: rank mismatches, dtype mismatches, broadcast-pattern
/// violations, misaligned storage, and non-finite content. Using a single
/// error type across the library simplifies error propagation.
///
/// Failure to *convert* between variable types is deliberately not an error:
/// `convert_variable` and `filter_variable` return `None` instead, leaving
/// error surfacing to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value's number of dimensions does not match the type's ndim.
    #[error("rank mismatch: type has {expected} dimension(s), value has {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Strict filtering received a value of the wrong dtype.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// A dtype coercion would lose information and `allow_downcast` was not set.
    #[error("refusing to implicitly downcast {from} to {to} (pass allow_downcast to override)")]
    Downcast { from: DType, to: DType },

    /// A dimension declared broadcastable (length-1) has a different extent.
    #[error("shape mismatch: dimension {dim} is broadcastable and must have length 1, got shape {shape}")]
    BroadcastMismatch { dim: usize, shape: Shape },

    /// The value's underlying buffer is not aligned for its element type.
    #[error("value storage is not aligned for {dtype} (element offset {offset} bytes into buffer)")]
    Misaligned { dtype: DType, offset: usize },

    /// Non-finite entries found while the finiteness check is enabled.
    #[error("Non-finite elements not allowed")]
    NonFinite,

    /// `filter` was handed a symbolic variable instead of a concrete value.
    #[error("cannot filter a symbolic variable; filtering operates on concrete values only")]
    SymbolicValue,

    /// Element count mismatch when creating a value from a flat buffer.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// An unrecognized dtype name.
    #[error("unknown dtype name: {0:?}")]
    UnknownDType(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Msg(e.to_string())
    }
}

/// Convenience Result type used throughout Vole.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
