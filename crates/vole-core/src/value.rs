use std::path::Path;
use std::sync::Arc;

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// Value — A concrete N-dimensional array value
//
// This is the data a TensorType filters: actual numbers in memory, as opposed
// to the symbolic variables of the graph. A Value is a cheap handle (Arc'd
// storage + layout + dtype), so cloning never copies elements and filtering
// can be identity-preserving: a conforming value passes through with its
// storage shared, whatever backing the caller supplied.
//
// STORAGE BACKINGS:
//
// Callers hand us values in several concrete containers, and filtering must
// not flatten them into one canonical form. Storage is therefore an enum:
//
//   - Typed buffers (F32(Vec<f32>), ...) — the common case, always aligned.
//   - Bytes — a view at an element offset into a raw byte buffer, e.g. a
//     region of a serialized checkpoint. May be misaligned for its dtype.
//   - Mmap — a memory-mapped file region. Page-aligned base, so alignment
//     again depends on the byte offset.
//
// Whether a buffer counts as aligned is decided by its byte offset relative
// to the element size; filter rejects misaligned values rather than silently
// copying them.

/// Flat storage holding the elements of one or more values.
#[derive(Debug)]
pub enum Storage {
    F16(Vec<half::f16>),
    BF16(Vec<half::bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    /// A view into a raw byte buffer, starting `byte_offset` bytes in.
    Bytes {
        data: Vec<u8>,
        byte_offset: usize,
        dtype: DType,
    },
    /// A memory-mapped file region, starting `byte_offset` bytes in.
    Mmap {
        map: memmap2::Mmap,
        byte_offset: usize,
        dtype: DType,
    },
}

impl Storage {
    /// The element dtype stored in this buffer.
    pub fn dtype(&self) -> DType {
        match self {
            Storage::F16(_) => DType::F16,
            Storage::BF16(_) => DType::BF16,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
            Storage::U8(_) => DType::U8,
            Storage::U32(_) => DType::U32,
            Storage::I32(_) => DType::I32,
            Storage::I64(_) => DType::I64,
            Storage::Bytes { dtype, .. } | Storage::Mmap { dtype, .. } => *dtype,
        }
    }

    /// Number of elements available in this buffer.
    pub fn len(&self) -> usize {
        match self {
            Storage::F16(v) => v.len(),
            Storage::BF16(v) => v.len(),
            Storage::F32(v) => v.len(),
            Storage::F64(v) => v.len(),
            Storage::U8(v) => v.len(),
            Storage::U32(v) => v.len(),
            Storage::I32(v) => v.len(),
            Storage::I64(v) => v.len(),
            Storage::Bytes {
                data,
                byte_offset,
                dtype,
            } => data.len().saturating_sub(*byte_offset) / dtype.size_in_bytes(),
            Storage::Mmap {
                map,
                byte_offset,
                dtype,
            } => map.len().saturating_sub(*byte_offset) / dtype.size_in_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer start is aligned for the element type. Typed
    /// buffers are aligned by construction; byte-backed buffers are aligned
    /// iff their byte offset is a multiple of the element size.
    pub fn is_aligned(&self) -> bool {
        match self {
            Storage::Bytes {
                byte_offset, dtype, ..
            }
            | Storage::Mmap {
                byte_offset, dtype, ..
            } => byte_offset % dtype.size_in_bytes() == 0,
            _ => true,
        }
    }

    /// Byte offset of the first element (0 for typed buffers).
    pub fn byte_offset(&self) -> usize {
        match self {
            Storage::Bytes { byte_offset, .. } | Storage::Mmap { byte_offset, .. } => *byte_offset,
            _ => 0,
        }
    }

    /// Read element `idx` as f64, whatever the backing.
    pub fn get_f64(&self, idx: usize) -> f64 {
        match self {
            Storage::F16(v) => v[idx].to_f32() as f64,
            Storage::BF16(v) => v[idx].to_f32() as f64,
            Storage::F32(v) => v[idx] as f64,
            Storage::F64(v) => v[idx],
            Storage::U8(v) => v[idx] as f64,
            Storage::U32(v) => v[idx] as f64,
            Storage::I32(v) => v[idx] as f64,
            Storage::I64(v) => v[idx] as f64,
            Storage::Bytes {
                data,
                byte_offset,
                dtype,
            } => read_elem_f64(data, *byte_offset, *dtype, idx),
            Storage::Mmap {
                map,
                byte_offset,
                dtype,
            } => read_elem_f64(map, *byte_offset, *dtype, idx),
        }
    }
}

/// Decode one element from a byte buffer in native byte order.
fn read_elem_f64(bytes: &[u8], byte_offset: usize, dtype: DType, idx: usize) -> f64 {
    let size = dtype.size_in_bytes();
    let start = byte_offset + idx * size;
    let raw = &bytes[start..start + size];
    match dtype {
        DType::F16 => half::f16::from_ne_bytes([raw[0], raw[1]]).to_f32() as f64,
        DType::BF16 => half::bf16::from_ne_bytes([raw[0], raw[1]]).to_f32() as f64,
        DType::F32 => f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
        DType::F64 => f64::from_ne_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]),
        DType::U8 => raw[0] as f64,
        DType::U32 => u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
        DType::I32 => i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
        DType::I64 => i64::from_ne_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]) as f64,
    }
}

/// Allocate a typed buffer of the given dtype from f64 data.
fn storage_from_f64(data: &[f64], dtype: DType) -> Storage {
    match dtype {
        DType::F16 => Storage::F16(data.iter().map(|&v| half::f16::from_f64(v)).collect()),
        DType::BF16 => Storage::BF16(data.iter().map(|&v| half::bf16::from_f64(v)).collect()),
        DType::F32 => Storage::F32(data.iter().map(|&v| v as f32).collect()),
        DType::F64 => Storage::F64(data.to_vec()),
        DType::U8 => Storage::U8(data.iter().map(|&v| v as u8).collect()),
        DType::U32 => Storage::U32(data.iter().map(|&v| v as u32).collect()),
        DType::I32 => Storage::I32(data.iter().map(|&v| v as i32).collect()),
        DType::I64 => Storage::I64(data.iter().map(|&v| v as i64).collect()),
    }
}

/// A concrete N-dimensional array value.
///
/// Values are cheap handles: the storage is shared via Arc, so `clone` is
/// O(1) and two values can be tested for shared backing with
/// [`Value::same_storage`].
#[derive(Debug, Clone)]
pub struct Value {
    storage: Arc<Storage>,
    layout: Layout,
    dtype: DType,
}

impl Value {
    /// Create a value from typed elements and a shape.
    pub fn from_slice<T: WithDType>(data: &[T], shape: impl Into<Shape>) -> Result<Value> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        let f64s: Vec<f64> = data.iter().map(|&v| v.to_f64()).collect();
        Ok(Value {
            storage: Arc::new(storage_from_f64(&f64s, T::DTYPE)),
            layout: Layout::contiguous(shape),
            dtype: T::DTYPE,
        })
    }

    /// Create a value from flat f64 data, converting to the target dtype.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Value> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Value {
            storage: Arc::new(storage_from_f64(data, dtype)),
            layout: Layout::contiguous(shape),
            dtype,
        })
    }

    /// Wrap a single Rust scalar as a 0-dimensional value.
    pub fn scalar<T: WithDType>(v: T) -> Value {
        Value {
            storage: Arc::new(storage_from_f64(&[v.to_f64()], T::DTYPE)),
            layout: Layout::contiguous(Shape::from(())),
            dtype: T::DTYPE,
        }
    }

    /// A zero-filled value of the given shape and dtype.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Value {
        let shape = shape.into();
        let data = vec![0.0; shape.elem_count()];
        Value {
            storage: Arc::new(storage_from_f64(&data, dtype)),
            layout: Layout::contiguous(shape),
            dtype,
        }
    }

    /// Create a value over a raw byte buffer, starting `byte_offset` bytes in.
    ///
    /// The buffer must hold enough bytes past the offset for the full shape.
    /// No alignment requirement is enforced here; a misaligned offset yields
    /// a value that `TensorType::filter` will reject.
    pub fn from_bytes(
        data: Vec<u8>,
        byte_offset: usize,
        dtype: DType,
        shape: impl Into<Shape>,
    ) -> Result<Value> {
        let shape = shape.into();
        let needed = shape.elem_count() * dtype.size_in_bytes();
        let avail = data.len().saturating_sub(byte_offset);
        if avail < needed {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: avail / dtype.size_in_bytes(),
                shape,
            });
        }
        Ok(Value {
            storage: Arc::new(Storage::Bytes {
                data,
                byte_offset,
                dtype,
            }),
            layout: Layout::contiguous(shape),
            dtype,
        })
    }

    /// Map a file and view its contents as a value of the given dtype/shape.
    ///
    /// The elements are read in native byte order starting at the beginning
    /// of the file.
    pub fn from_memmap(path: impl AsRef<Path>, dtype: DType, shape: impl Into<Shape>) -> Result<Value> {
        let shape = shape.into();
        let file = std::fs::File::open(path)?;
        let map = unsafe { memmap2::Mmap::map(&file)? };
        let needed = shape.elem_count() * dtype.size_in_bytes();
        if map.len() < needed {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: map.len() / dtype.size_in_bytes(),
                shape,
            });
        }
        Ok(Value {
            storage: Arc::new(Storage::Mmap {
                map,
                byte_offset: 0,
                dtype,
            }),
            layout: Layout::contiguous(shape),
            dtype,
        })
    }

    // Accessors

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.layout.elem_count()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether the underlying buffer is aligned for the element type.
    pub fn is_aligned(&self) -> bool {
        self.storage.is_aligned()
    }

    /// Whether this value is backed by a memory-mapped file.
    pub fn is_memmap(&self) -> bool {
        matches!(*self.storage, Storage::Mmap { .. })
    }

    /// Byte offset of the first element within the backing buffer
    /// (0 for typed buffers).
    pub fn storage_byte_offset(&self) -> usize {
        self.storage.byte_offset()
    }

    /// True iff `self` and `other` share the same underlying storage buffer.
    /// This is the identity test filtering preserves: a conforming value
    /// passes through without its elements being copied.
    pub fn same_storage(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Copy all elements to a host Vec<f64>, in logical (row-major) order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.layout
            .strided_indices()
            .map(|i| self.storage.get_f64(i))
            .collect()
    }

    /// The single element of a 0-d or one-element value.
    pub fn to_f64_scalar(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            crate::bail!("not a scalar: value has shape {}", self.shape());
        }
        Ok(self
            .layout
            .strided_indices()
            .next()
            .map(|i| self.storage.get_f64(i))
            .unwrap_or(0.0))
    }

    /// True iff no element is NaN or infinite. Integer values are trivially
    /// all-finite.
    pub fn is_all_finite(&self) -> bool {
        if self.dtype.is_int() {
            return true;
        }
        self.layout
            .strided_indices()
            .all(|i| self.storage.get_f64(i).is_finite())
    }

    /// Copy this value into fresh storage of a different dtype. Goes through
    /// f64, the same host round-trip the backends fall back to for casts.
    pub fn cast(&self, dtype: DType) -> Value {
        let data = self.to_f64_vec();
        Value {
            storage: Arc::new(storage_from_f64(&data, dtype)),
            layout: Layout::contiguous(self.shape().clone()),
            dtype,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value(shape={}, dtype={})", self.shape(), self.dtype)
    }
}

// Scalar — A raw Rust scalar before it becomes a value
//
// Filtering distinguishes raw scalars from 0-d arrays: a raw float scalar
// may be downcast into a float-typed target even without allow_downcast
// (the historical convenience for literals), while array values never are.

/// A raw numeric scalar supplied directly by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F16(half::f16),
    BF16(half::bf16),
    F32(f32),
    F64(f64),
    U8(u8),
    U32(u32),
    I32(i32),
    I64(i64),
}

impl Scalar {
    /// The dtype this scalar carries natively.
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::F16(_) => DType::F16,
            Scalar::BF16(_) => DType::BF16,
            Scalar::F32(_) => DType::F32,
            Scalar::F64(_) => DType::F64,
            Scalar::U8(_) => DType::U8,
            Scalar::U32(_) => DType::U32,
            Scalar::I32(_) => DType::I32,
            Scalar::I64(_) => DType::I64,
        }
    }

    /// Whether this is a floating-point scalar.
    pub fn is_float(&self) -> bool {
        self.dtype().is_float()
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Scalar::F16(v) => v.to_f32() as f64,
            Scalar::BF16(v) => v.to_f32() as f64,
            Scalar::F32(v) => *v as f64,
            Scalar::F64(v) => *v,
            Scalar::U8(v) => *v as f64,
            Scalar::U32(v) => *v as f64,
            Scalar::I32(v) => *v as f64,
            Scalar::I64(v) => *v as f64,
        }
    }

    /// Wrap as a 0-dimensional value of the given dtype.
    pub fn to_value(&self, dtype: DType) -> Value {
        Value {
            storage: Arc::new(storage_from_f64(&[self.to_f64()], dtype)),
            layout: Layout::contiguous(Shape::from(())),
            dtype,
        }
    }
}

impl From<half::f16> for Scalar {
    fn from(v: half::f16) -> Self {
        Scalar::F16(v)
    }
}

impl From<half::bf16> for Scalar {
    fn from(v: half::bf16) -> Self {
        Scalar::BF16(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F64(v)
    }
}

impl From<u8> for Scalar {
    fn from(v: u8) -> Self {
        Scalar::U8(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::U32(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::I64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice() {
        let v = Value::from_slice(&[1.0f32, 2.0, 3.0, 4.0], (2, 2)).unwrap();
        assert_eq!(v.dtype(), DType::F32);
        assert_eq!(v.dims(), &[2, 2]);
        assert_eq!(v.to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_slice_count_mismatch() {
        assert!(Value::from_slice(&[1.0f32, 2.0, 3.0], (2, 2)).is_err());
    }

    #[test]
    fn test_scalar_value() {
        let v = Value::scalar(7i64);
        assert_eq!(v.rank(), 0);
        assert_eq!(v.dtype(), DType::I64);
        assert_eq!(v.to_f64_scalar().unwrap(), 7.0);
    }

    #[test]
    fn test_clone_shares_storage() {
        let v = Value::from_slice(&[1.0f64, 2.0], 2).unwrap();
        let w = v.clone();
        assert!(v.same_storage(&w));
        let x = Value::from_slice(&[1.0f64, 2.0], 2).unwrap();
        assert!(!v.same_storage(&x));
    }

    #[test]
    fn test_bytes_backing_alignment() {
        // 3 f32 elements at byte offset 4: aligned.
        let mut bytes = vec![0u8; 16];
        for (i, v) in [1.0f32, 2.0, 3.0].iter().enumerate() {
            bytes[4 + i * 4..8 + i * 4].copy_from_slice(&v.to_ne_bytes());
        }
        let v = Value::from_bytes(bytes.clone(), 4, DType::F32, 3).unwrap();
        assert!(v.is_aligned());
        assert_eq!(v.to_f64_vec(), vec![1.0, 2.0, 3.0]);

        // Same buffer at byte offset 1: misaligned for f32.
        let v = Value::from_bytes(bytes, 1, DType::F32, 3).unwrap();
        assert!(!v.is_aligned());
    }

    #[test]
    fn test_bytes_backing_too_short() {
        assert!(Value::from_bytes(vec![0u8; 8], 0, DType::F32, 3).is_err());
    }

    #[test]
    fn test_is_all_finite() {
        let v = Value::from_slice(&[1.0f32, f32::INFINITY], 2).unwrap();
        assert!(!v.is_all_finite());
        let v = Value::from_slice(&[1.0f32, 2.0], 2).unwrap();
        assert!(v.is_all_finite());
        // Integer values are always finite.
        let v = Value::from_slice(&[1i64, 2], 2).unwrap();
        assert!(v.is_all_finite());
    }

    #[test]
    fn test_cast() {
        let v = Value::from_slice(&[1i32, 2, 3], 3).unwrap();
        let c = v.cast(DType::F64);
        assert_eq!(c.dtype(), DType::F64);
        assert_eq!(c.to_f64_vec(), vec![1.0, 2.0, 3.0]);
        assert!(!c.same_storage(&v));
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(Scalar::from(1.5f64).dtype(), DType::F64);
        assert_eq!(Scalar::from(1i32).dtype(), DType::I32);
        assert!(Scalar::from(1.5f32).is_float());
        assert!(!Scalar::from(1u8).is_float());
    }
}
