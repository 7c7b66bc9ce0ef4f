//! Edit intents to operations.
//!
//! Each node variant that can be edited has a context. A context turns an
//! intent such as "insert `" cat"` at index 4" into the [`Operation`] that
//! carries it out, addressed relative to the node being edited. The intent
//! itself is never transmitted, only the operation.
//!
//! [`Context::compute`] only reads the tree. [`Context::apply_live`] computes
//! and then applies the result to the same node, handing the operation back
//! so the caller can pass it on to other replicas.

mod map;
mod number;
mod sequence;

pub use map::MapContext;
pub use map::MapEdit;
pub use map::SingleContext;
pub use number::Delta;
pub use number::NumberContext;
pub use sequence::ListContext;
pub use sequence::ListEdit;
pub use sequence::StringContext;
pub use sequence::StringEdit;
pub use sequence::Trace;
pub use sequence::trace_elem;
pub use sequence::trace_index;

use crate::crdt::op::Operation;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Result;

pub trait Context {
    /// The edit intents this context understands.
    type Edit;

    /// Build the operation for `edit` on node `id`, relative to `id`.
    fn compute(tree: &Tree, id: NodeId, edit: Self::Edit) -> Result<Operation>;

    /// Build the operation for `edit`, apply it to `id`, and return it.
    fn apply_live(tree: &mut Tree, id: NodeId, edit: Self::Edit) -> Result<Operation> {
        let op = Self::compute(tree, id, edit)?;
        op.apply(tree, id)?;
        return Ok(op);
    }
}
