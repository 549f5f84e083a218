use std::sync::Arc;

use crate::error::Result;
use crate::ttype::TensorType;
use crate::value::Value;

// Variable — A symbolic graph variable tagged with a TensorType
//
// A Variable is a node in the computation graph: it knows its type but not
// necessarily a value. Three origins exist:
//
//   Leaf     — an input minted by TensorType::variable("x")
//   Constant — carries a fixed concrete Value alongside its type tag
//   View     — re-tags an existing variable with a more specific type,
//              sharing the source node (no data involved)
//
// Like tensors elsewhere in the stack, a Variable is a cheap Arc handle:
// cloning increments a refcount, and identity ("is this literally the same
// node?") is pointer identity on the inner allocation, exposed as `same_as`.
// Type reconciliation relies on that: convert_variable returns the original
// handle whenever the variable already satisfies the target type.

/// Unique identifier for a variable node (global atomic counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u64);

impl VarId {
    fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        VarId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// How a variable came to exist.
#[derive(Debug)]
pub enum Origin {
    /// A named graph input with no value.
    Leaf { name: Option<String> },
    /// A constant node carrying its concrete value.
    Constant(Value),
    /// A retyped view of another variable. The view shares the source node;
    /// only the type tag differs.
    View { source: Variable },
}

struct VariableInner {
    id: VarId,
    ttype: TensorType,
    origin: Origin,
}

/// A symbolic variable: a graph node tagged with a [`TensorType`].
pub struct Variable {
    inner: Arc<VariableInner>,
}

// Manual Clone: Arc::clone is cheap (just increment refcount).
impl Clone for Variable {
    fn clone(&self) -> Self {
        Variable {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Variable {
    /// Mint a fresh symbolic leaf of the given type.
    pub fn symbolic(ttype: TensorType, name: Option<String>) -> Variable {
        Variable {
            inner: Arc::new(VariableInner {
                id: VarId::new(),
                ttype,
                origin: Origin::Leaf { name },
            }),
        }
    }

    /// Wrap a concrete value as a constant node. The type is inferred from
    /// the value: its dtype, and a broadcast pattern asserting exactly the
    /// length-1 dimensions.
    pub fn constant(value: Value) -> Variable {
        let ttype = TensorType::new(value.dtype(), &value.shape().broadcastable_pattern());
        Variable {
            inner: Arc::new(VariableInner {
                id: VarId::new(),
                ttype,
                origin: Origin::Constant(value),
            }),
        }
    }

    /// Wrap a concrete value as a constant with an explicitly supplied type.
    /// The type may be less specific than what [`Variable::constant`] would
    /// infer, but the value must satisfy it (same dtype and rank, length 1
    /// wherever the pattern asserts it).
    pub fn constant_with_type(value: Value, ttype: TensorType) -> Result<Variable> {
        if !ttype.value_fits(&value) {
            crate::bail!("constant value {} does not satisfy {}", value, ttype);
        }
        Ok(Variable {
            inner: Arc::new(VariableInner {
                id: VarId::new(),
                ttype,
                origin: Origin::Constant(value),
            }),
        })
    }

    /// Re-tag this variable with a different (typically more specific) type.
    /// The result is a new node viewing `self`; no data is copied.
    pub fn view_as(&self, ttype: TensorType) -> Variable {
        Variable {
            inner: Arc::new(VariableInner {
                id: VarId::new(),
                ttype,
                origin: Origin::View {
                    source: self.clone(),
                },
            }),
        }
    }

    /// Unique node id.
    pub fn id(&self) -> VarId {
        self.inner.id
    }

    /// The type descriptor this variable is tagged with.
    pub fn ttype(&self) -> &TensorType {
        &self.inner.ttype
    }

    /// The leaf name, if this variable is a named input.
    pub fn name(&self) -> Option<&str> {
        match &self.inner.origin {
            Origin::Leaf { name } => name.as_deref(),
            _ => None,
        }
    }

    /// The concrete value, if this variable is a constant node.
    pub fn value(&self) -> Option<&Value> {
        match &self.inner.origin {
            Origin::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.inner.origin, Origin::Constant(_))
    }

    /// The variable this one views, if it is a retyped view.
    pub fn view_source(&self) -> Option<&Variable> {
        match &self.inner.origin {
            Origin::View { source } => Some(source),
            _ => None,
        }
    }

    /// Node identity: true iff `self` and `other` are the same graph node
    /// (not merely structurally equal).
    pub fn same_as(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner.origin {
            Origin::Leaf { name: Some(n) } => write!(f, "Variable({}, {})", n, self.ttype()),
            Origin::Leaf { name: None } => {
                write!(f, "Variable(id={:?}, {})", self.id(), self.ttype())
            }
            Origin::Constant(v) => write!(f, "Constant({}, {})", v, self.ttype()),
            Origin::View { source } => {
                write!(f, "View(of id={:?}, {})", source.id(), self.ttype())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_leaf_identity() {
        let t = TensorType::new(DType::F64, &[false, false]);
        let x = t.variable("x");
        let y = x.clone();
        assert!(x.same_as(&y));
        assert_eq!(x.id(), y.id());
        let z = t.variable("z");
        assert!(!x.same_as(&z));
    }

    #[test]
    fn test_constant_type_inference() {
        let v = Value::from_slice(&[1.0f32, 2.0, 3.0], (1, 3)).unwrap();
        let c = Variable::constant(v);
        assert!(c.is_constant());
        assert_eq!(c.ttype().dtype(), DType::F32);
        assert_eq!(c.ttype().broadcastable(), &[true, false]);
    }

    #[test]
    fn test_view_keeps_source() {
        let t = TensorType::new(DType::F32, &[false]);
        let x = t.variable("x");
        let narrower = TensorType::new(DType::F32, &[true]);
        let v = x.view_as(narrower.clone());
        assert_eq!(v.ttype(), &narrower);
        assert!(v.view_source().unwrap().same_as(&x));
    }
}
