use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::value::{Scalar, Value};
use crate::variable::Variable;

// TensorType — The shape-class and element type of a symbolic tensor
//
// A TensorType describes what a variable's runtime value must look like:
// its element dtype and, per dimension, whether the dimension is guaranteed
// to have length 1 (broadcastable). It is a pure, immutable descriptor.
// The partial order between descriptors (is_super) and the coercion of
// candidate values (filter) is the whole of the type checking the graph
// layer relies on.
//
// SUBTYPING:
//
//   (float64, [false, false])  is_super  (float64, [false, true])
//
// A type asserting broadcastability in fewer positions accepts more values,
// so it sits above the more specific type. Types never relate across
// different ndim or dtype.

/// Relative tolerance used by [`TensorType::values_eq_approx`].
pub const APPROX_RTOL: f64 = 1e-5;
/// Absolute tolerance used by [`TensorType::values_eq_approx`].
pub const APPROX_ATOL: f64 = 1e-8;

/// Describes the element dtype and broadcast pattern of a symbolic tensor.
///
/// Structural equality (and hashing) covers `dtype` and `broadcastable`
/// only; the `filter_checks_isfinite` diagnostic toggle does not affect
/// which class a type belongs to.
#[derive(Debug, Clone)]
pub struct TensorType {
    dtype: DType,
    broadcastable: Vec<bool>,
    /// When set, `filter` rejects values containing NaN or infinite entries.
    pub filter_checks_isfinite: bool,
}

impl PartialEq for TensorType {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.broadcastable == other.broadcastable
    }
}

impl Eq for TensorType {}

impl Hash for TensorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dtype.hash(state);
        self.broadcastable.hash(state);
    }
}

impl fmt::Display for TensorType {
    /// `TensorType(float32, [1, ?])` — `1` marks broadcastable dimensions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorType({}, [", self.dtype)?;
        for (i, b) in self.broadcastable.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", if *b { "1" } else { "?" })?;
        }
        write!(f, "])")
    }
}

impl TensorType {
    /// Create a type descriptor from a dtype and broadcast pattern.
    pub fn new(dtype: DType, broadcastable: &[bool]) -> Self {
        TensorType {
            dtype,
            broadcastable: broadcastable.to_vec(),
            filter_checks_isfinite: false,
        }
    }

    /// Create a type descriptor from a Rust element type.
    /// `TensorType::of::<i32>(&[])` is a 0-d int32 type.
    pub fn of<T: WithDType>(broadcastable: &[bool]) -> Self {
        Self::new(T::DTYPE, broadcastable)
    }

    /// Create a type descriptor from a dtype name ("int32", "float64", ...).
    pub fn from_name(name: &str, broadcastable: &[bool]) -> Result<Self> {
        Ok(Self::new(name.parse()?, broadcastable))
    }

    /// A 0-d type of the default float dtype.
    pub fn scalar() -> Self {
        Self::new(config::float_x(), &[])
    }

    /// A 1-d type of the default float dtype, no broadcast guarantee.
    pub fn vector() -> Self {
        Self::new(config::float_x(), &[false])
    }

    /// A 2-d type of the default float dtype, no broadcast guarantees.
    pub fn matrix() -> Self {
        Self::new(config::float_x(), &[false, false])
    }

    // Accessors

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn broadcastable(&self) -> &[bool] {
        &self.broadcastable
    }

    /// Number of dimensions this type describes.
    pub fn ndim(&self) -> usize {
        self.broadcastable.len()
    }

    /// Mint a fresh symbolic variable of this type.
    pub fn variable(&self, name: impl Into<String>) -> Variable {
        Variable::symbolic(self.clone(), Some(name.into()))
    }

    // Class membership and subtyping

    /// Two types are in the same class iff their dtype and broadcast
    /// patterns match exactly. Same-class descriptors are interchangeable
    /// without any coercion.
    pub fn in_same_class(&self, other: &TensorType) -> bool {
        self == other
    }

    /// True iff `self` is a valid supertype of `other`: same dtype, same
    /// ndim, and wherever `self` asserts broadcastability, `other` asserts
    /// it too. Reflexive; never true across differing ndim.
    pub fn is_super(&self, other: &TensorType) -> bool {
        self.dtype == other.dtype
            && self.ndim() == other.ndim()
            && self
                .broadcastable
                .iter()
                .zip(other.broadcastable.iter())
                .all(|(s, o)| !*s || *o)
    }

    // Variable reconciliation

    /// Try to reconcile an existing variable with this type.
    ///
    /// Returns the original variable whenever it already satisfies this
    /// type's contract (same class, or this type is a supertype of its
    /// type). When the variable's type is strictly broader, returns a fresh
    /// view of it re-tagged with this more specific type (no data copy). A
    /// constant whose concrete value fits this type also passes through
    /// unchanged. Returns `None` when no conversion exists; this is the
    /// expected-mismatch path and never an error.
    pub fn convert_variable(&self, other: &Variable) -> Option<Variable> {
        let other_type = other.ttype();
        if self.in_same_class(other_type) || self.is_super(other_type) {
            return Some(other.clone());
        }
        if other_type.is_super(self) {
            return Some(other.view_as(self.clone()));
        }
        if let Some(value) = other.value() {
            if self.value_fits(value) {
                return Some(other.clone());
            }
        }
        None
    }

    /// Whether a concrete value satisfies this type without any coercion:
    /// exact dtype, exact rank, and length 1 wherever the pattern asserts it.
    pub(crate) fn value_fits(&self, value: &Value) -> bool {
        value.dtype() == self.dtype
            && value.rank() == self.ndim()
            && self
                .broadcastable
                .iter()
                .zip(value.dims().iter())
                .all(|(b, &d)| !*b || d == 1)
    }

    /// Variable-to-variable filtering.
    ///
    /// An exact-class match always succeeds with the original variable.
    /// Otherwise conversion is attempted only when `allow_convert` is set;
    /// the returned variable carries the more specific of the two types.
    pub fn filter_variable(&self, other: &Variable, allow_convert: bool) -> Option<Variable> {
        if other.ttype().in_same_class(self) {
            return Some(other.clone());
        }
        if allow_convert {
            return self.convert_variable(other);
        }
        None
    }

    // Value filtering

    /// Coerce a candidate value into a value conforming to this type.
    ///
    /// `strict` forbids any dtype conversion. `allow_downcast` widens the
    /// default upcast-only coercion policy: `Some(true)` permits lossy
    /// casts, `Some(false)` forbids them, and `None` applies the default
    /// policy plus its one historical exception: a raw float scalar may be
    /// downcast into a float-typed target.
    ///
    /// Conforming values pass through with their storage shared (identity-
    /// preserving), whatever backing the caller supplied. Symbolic variables
    /// are always rejected: filtering operates on concrete values only.
    pub fn filter(
        &self,
        input: impl Into<FilterInput>,
        strict: bool,
        allow_downcast: Option<bool>,
    ) -> Result<Value> {
        match input.into() {
            FilterInput::Symbolic(_) => Err(Error::SymbolicValue),
            FilterInput::Scalar(s) => self.filter_scalar(s, strict, allow_downcast),
            FilterInput::Value(v) => self.filter_value(v, strict, allow_downcast),
        }
    }

    fn filter_scalar(
        &self,
        scalar: Scalar,
        strict: bool,
        allow_downcast: Option<bool>,
    ) -> Result<Value> {
        if self.ndim() != 0 {
            return Err(Error::RankMismatch {
                expected: self.ndim(),
                got: 0,
            });
        }
        let from = scalar.dtype();
        if strict {
            // A native scalar of the wrong numeric kind is rejected even
            // when its value would be representable.
            if from != self.dtype {
                return Err(Error::DTypeMismatch {
                    expected: self.dtype,
                    got: from,
                });
            }
        } else if !from.can_upcast_to(self.dtype) {
            let float_literal_ok =
                allow_downcast.is_none() && scalar.is_float() && self.dtype.is_float();
            if allow_downcast != Some(true) && !float_literal_ok {
                return Err(Error::Downcast {
                    from,
                    to: self.dtype,
                });
            }
        }
        let value = scalar.to_value(self.dtype);
        if self.filter_checks_isfinite && !value.is_all_finite() {
            return Err(Error::NonFinite);
        }
        Ok(value)
    }

    fn filter_value(
        &self,
        value: Value,
        strict: bool,
        allow_downcast: Option<bool>,
    ) -> Result<Value> {
        if value.rank() != self.ndim() {
            return Err(Error::RankMismatch {
                expected: self.ndim(),
                got: value.rank(),
            });
        }
        for (i, b) in self.broadcastable.iter().enumerate() {
            if *b && value.dims()[i] != 1 {
                return Err(Error::BroadcastMismatch {
                    dim: i,
                    shape: value.shape().clone(),
                });
            }
        }
        if !value.is_aligned() {
            return Err(Error::Misaligned {
                dtype: value.dtype(),
                offset: value.storage_byte_offset(),
            });
        }
        let value = if value.dtype() == self.dtype {
            value
        } else if strict {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: value.dtype(),
            });
        } else if value.dtype().can_upcast_to(self.dtype) || allow_downcast == Some(true) {
            value.cast(self.dtype)
        } else {
            return Err(Error::Downcast {
                from: value.dtype(),
                to: self.dtype,
            });
        };
        if self.filter_checks_isfinite && !value.is_all_finite() {
            return Err(Error::NonFinite);
        }
        Ok(value)
    }

    /// A zero-filled value of this type. The dims must satisfy the broadcast
    /// pattern and rank.
    pub fn value_zeros(&self, dims: &[usize]) -> Result<Value> {
        let zeros = Value::zeros(dims, self.dtype);
        self.filter(zeros, true, None)
    }

    // Value equality

    /// Exact elementwise equality: shapes must match, every element must
    /// compare equal (NaN never equals NaN).
    pub fn values_eq(a: &Value, b: &Value) -> bool {
        if a.shape() != b.shape() {
            return false;
        }
        a.to_f64_vec()
            .iter()
            .zip(b.to_f64_vec().iter())
            .all(|(x, y)| x == y)
    }

    /// Approximate elementwise equality with the default special-value
    /// policy: infinities must match sign and position, a NaN in `a` matches
    /// anything in `b`.
    pub fn values_eq_approx(a: &Value, b: &Value) -> bool {
        Self::values_eq_approx_with(a, b, false, true)
    }

    /// Approximate elementwise equality up to floating-point tolerance.
    ///
    /// Shapes must match exactly. Finite entries compare with relative plus
    /// absolute tolerance ([`APPROX_RTOL`], [`APPROX_ATOL`]); integer-typed
    /// values compare exactly. `allow_remove_inf` masks every infinite entry
    /// of `a` (it matches any value of `b` at that position); the same
    /// masking applies to NaN entries of `a` under `allow_remove_nan`.
    /// Unmasked comparisons that touch a non-finite value emit a diagnostic
    /// `log` warning so callers can detect that the special-value path was
    /// engaged.
    pub fn values_eq_approx_with(
        a: &Value,
        b: &Value,
        allow_remove_inf: bool,
        allow_remove_nan: bool,
    ) -> bool {
        if a.shape() != b.shape() {
            return false;
        }
        let exact = a.dtype().is_int() && b.dtype().is_int();
        let av = a.to_f64_vec();
        let bv = b.to_f64_vec();
        let mut equal = true;
        let mut special = false;
        for (&x, &y) in av.iter().zip(bv.iter()) {
            if x.is_nan() {
                if allow_remove_nan {
                    continue;
                }
                special = true;
                if !y.is_nan() {
                    equal = false;
                }
                continue;
            }
            if x.is_infinite() {
                if allow_remove_inf {
                    continue;
                }
                special = true;
                if x != y {
                    equal = false;
                }
                continue;
            }
            if !y.is_finite() {
                special = true;
                equal = false;
                continue;
            }
            if exact {
                if x != y {
                    equal = false;
                }
            } else if (x - y).abs() > APPROX_ATOL + APPROX_RTOL * y.abs() {
                equal = false;
            }
        }
        if special {
            log::warn!("values_eq_approx: comparison engaged non-finite (inf/NaN) handling");
        }
        equal
    }
}

// FilterInput — What callers may hand to `TensorType::filter`
//
// Filtering accepts concrete values, raw Rust scalars, and (so the error
// path is expressible) symbolic variables, which are always rejected.

/// A candidate input to [`TensorType::filter`].
#[derive(Debug, Clone)]
pub enum FilterInput {
    Value(Value),
    Scalar(Scalar),
    Symbolic(Variable),
}

impl From<Value> for FilterInput {
    fn from(v: Value) -> Self {
        FilterInput::Value(v)
    }
}

impl From<&Value> for FilterInput {
    fn from(v: &Value) -> Self {
        FilterInput::Value(v.clone())
    }
}

impl From<Scalar> for FilterInput {
    fn from(s: Scalar) -> Self {
        FilterInput::Scalar(s)
    }
}

impl From<Variable> for FilterInput {
    fn from(v: Variable) -> Self {
        FilterInput::Symbolic(v)
    }
}

impl From<&Variable> for FilterInput {
    fn from(v: &Variable) -> Self {
        FilterInput::Symbolic(v.clone())
    }
}

macro_rules! filter_input_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FilterInput {
                fn from(v: $t) -> Self {
                    FilterInput::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

filter_input_from_scalar!(f32, f64, u8, u32, i32, i64, half::f16, half::bf16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality_ignores_isfinite_flag() {
        let a = TensorType::new(DType::F32, &[false, true]);
        let mut b = TensorType::new(DType::F32, &[false, true]);
        b.filter_checks_isfinite = true;
        assert_eq!(a, b);
        assert!(a.in_same_class(&b));
        assert_ne!(a, TensorType::new(DType::F64, &[false, true]));
    }

    #[test]
    fn test_display() {
        let t = TensorType::new(DType::F32, &[true, false]);
        assert_eq!(format!("{t}"), "TensorType(float32, [1, ?])");
        assert_eq!(
            format!("{}", TensorType::new(DType::I64, &[])),
            "TensorType(int64, [])"
        );
    }

    #[test]
    fn test_of_and_from_name_normalize() {
        assert_eq!(TensorType::of::<i32>(&[]).dtype().name(), "int32");
        let t = TensorType::from_name("float64", &[false]).unwrap();
        assert_eq!(t.dtype(), DType::F64);
        assert!(TensorType::from_name("complex64", &[]).is_err());
    }

    #[test]
    fn test_shortcut_constructors_use_float_x() {
        crate::config::with_float_x(DType::F32, || {
            assert_eq!(TensorType::matrix().dtype(), DType::F32);
            assert_eq!(TensorType::matrix().ndim(), 2);
            assert_eq!(TensorType::vector().ndim(), 1);
            assert_eq!(TensorType::scalar().ndim(), 0);
        });
    }

    #[test]
    fn test_is_super_partial_order() {
        // For equal-length patterns, p1 is_super p2 iff p1's true positions
        // are a subset of p2's.
        let patterns: &[&[bool]] = &[
            &[false, false],
            &[false, true],
            &[true, false],
            &[true, true],
        ];
        for p1 in patterns {
            for p2 in patterns {
                let t1 = TensorType::new(DType::F32, p1);
                let t2 = TensorType::new(DType::F32, p2);
                let expected = p1.iter().zip(p2.iter()).all(|(a, b)| !*a || *b);
                assert_eq!(t1.is_super(&t2), expected, "{p1:?} vs {p2:?}");
            }
        }
    }

    #[test]
    fn test_value_zeros() {
        let t = TensorType::new(DType::F32, &[true, false]);
        let v = t.value_zeros(&[1, 4]).unwrap();
        assert_eq!(v.dims(), &[1, 4]);
        assert_eq!(v.to_f64_vec(), vec![0.0; 4]);
        // Dims violating the pattern are rejected.
        assert!(t.value_zeros(&[2, 4]).is_err());
    }

    #[test]
    fn test_values_eq_exact() {
        let a = Value::from_slice(&[1.0f64, f64::NAN], 2).unwrap();
        let b = Value::from_slice(&[1.0f64, f64::NAN], 2).unwrap();
        // NaN never equals NaN under exact equality.
        assert!(!TensorType::values_eq(&a, &b));
        let c = Value::from_slice(&[1.0f64, 2.0], 2).unwrap();
        let d = Value::from_slice(&[1.0f64, 2.0], 2).unwrap();
        assert!(TensorType::values_eq(&c, &d));
        let e = Value::from_slice(&[1.0f64, 2.0], (1, 2)).unwrap();
        assert!(!TensorType::values_eq(&c, &e));
    }

    #[test]
    fn test_values_eq_approx_tolerance() {
        let a = Value::from_slice(&[1.0f64, 2.0], 2).unwrap();
        let b = Value::from_slice(&[1.0 + 1e-9, 2.0 - 1e-9], 2).unwrap();
        assert!(TensorType::values_eq_approx(&a, &b));
        let c = Value::from_slice(&[1.1f64, 2.0], 2).unwrap();
        assert!(!TensorType::values_eq_approx(&a, &c));
    }

    #[test]
    fn test_values_eq_approx_int_exact() {
        let a = Value::from_slice(&[1i64, 2], 2).unwrap();
        let b = Value::from_slice(&[1i64, 2], 2).unwrap();
        assert!(TensorType::values_eq_approx(&a, &b));
        let c = Value::from_slice(&[1i64, 3], 2).unwrap();
        assert!(!TensorType::values_eq_approx(&a, &c));
    }
}
