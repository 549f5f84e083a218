use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// DType — Supported element data types
//
// Every tensor type and every concrete value carries a DType that determines
// its element size and numeric behavior:
//
//   F16  — 16-bit IEEE half float
//   BF16 — 16-bit brain float
//   F32  — 32-bit float, the default workhorse
//   F64  — 64-bit float, for high-precision work
//   U8   — unsigned byte, for image data and boolean masks
//   U32  — unsigned 32-bit int, for indices
//   I32  — signed 32-bit int
//   I64  — signed 64-bit int, for labels/indices
//
// Each dtype has a canonical string name ("float32", "int64", ...). Type
// descriptors normalize whatever the caller supplies — a DType, a Rust
// element type, or a name — down to one of these variants.

/// Enum of all supported element data types.
///
/// This is stored inside every type descriptor and every concrete value so
/// operations can dispatch to the correct typed representation at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I32,
    I64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
            DType::U8 => 1,
            DType::U32 => 4,
            DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is an integer type (signed or unsigned).
    pub fn is_int(&self) -> bool {
        !self.is_float()
    }

    /// The canonical string name of this dtype ("float32", "int64", ...).
    pub fn name(&self) -> &'static str {
        match self {
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::U8 => "uint8",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::I64 => "int64",
        }
    }

    /// Whether every value of this dtype is exactly representable in `target`.
    ///
    /// This is the "safe cast" relation that non-strict filtering uses by
    /// default: coercion is allowed only upward. One deliberate exception
    /// follows the numpy convention: int64 → float64 counts as an upcast even
    /// though integers above 2^53 lose precision.
    pub fn can_upcast_to(&self, target: DType) -> bool {
        use DType::*;
        if *self == target {
            return true;
        }
        match self {
            F16 => matches!(target, F32 | F64),
            BF16 => matches!(target, F32 | F64),
            F32 => matches!(target, F64),
            F64 => false,
            U8 => matches!(target, U32 | I32 | I64 | F16 | F32 | F64),
            U32 => matches!(target, I64 | F64),
            I32 => matches!(target, I64 | F64),
            I64 => matches!(target, F64),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    /// Normalize a dtype name to a DType. Accepts the canonical names plus
    /// the short aliases used in shape annotations ("f32", "i64", ...).
    fn from_str(s: &str) -> Result<Self> {
        let dtype = match s {
            "float16" | "f16" | "half" => DType::F16,
            "bfloat16" | "bf16" => DType::BF16,
            "float32" | "f32" | "float" => DType::F32,
            "float64" | "f64" | "double" => DType::F64,
            "uint8" | "u8" => DType::U8,
            "uint32" | "u32" => DType::U32,
            "int32" | "i32" => DType::I32,
            "int64" | "i64" => DType::I64,
            _ => return Err(Error::UnknownDType(s.to_string())),
        };
        Ok(dtype)
    }
}

// WithDType — Trait that connects Rust element types to the DType enum
//
// This trait is the bridge between Rust's type system and the runtime DType.
// By implementing it for f32, i64, etc., generic constructors like
// `Value::from_slice::<f32>(..)` can determine the DType from the element
// type, and `TensorType::of::<i32>(..)` can normalize a Rust type to a dtype.

/// Trait implemented by Rust types that can be stored in a tensor value.
///
/// Provides the mapping between the concrete Rust type and the DType enum,
/// plus conversions to/from f64 for generic numeric code.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + std::fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// The zero value.
    fn zero() -> Self {
        Self::from_f64(0.0)
    }
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

impl WithDType for u8 {
    const DTYPE: DType = DType::U8;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as u8
    }
}

impl WithDType for u32 {
    const DTYPE: DType = DType::U32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as u32
    }
}

impl WithDType for i32 {
    const DTYPE: DType = DType::I32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as i32
    }
}

impl WithDType for i64 {
    const DTYPE: DType = DType::I64;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as i64
    }
}
