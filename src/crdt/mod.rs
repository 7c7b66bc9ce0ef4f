//! The tree, its nodes, and the instructions and operations that grow it.
//!
//! Everything here is deterministic given the same set of operations. Nothing
//! is ever removed from a tree; deletion only tombstones.

pub mod child_set;
pub mod event;
pub mod instruction;
pub mod node;
pub mod op;
pub mod primitives;
pub mod tree;

pub use child_set::ChildSet;
pub use event::Event;
pub use event::EventGrid;
pub use instruction::Instruction;
pub use node::Leaf;
pub use node::Node;
pub use node::NodeKind;
pub use node::NodeType;
pub use node::Unique;
pub use op::Operation;
pub use tree::NodeId;
pub use tree::Tree;
