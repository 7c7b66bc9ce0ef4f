//! ConcurrenTree - a conflict-free replicated tree for JSON-like documents.
//!
//! Every value lives in a tree of nodes keyed by a hash of their content.
//! Edits are [`Operation`]s: flat lists of insert and delete instructions
//! addressed from the root. Inserts are keyed and deletes only tombstone, so
//! any two replicas that have applied the same operations, in any order,
//! flatten to the same value.
//!
//! # Quick Start
//!
//! ```
//! use concurrentree::Document;
//! use concurrentree::ReplicaId;
//! use serde_json::json;
//!
//! let mut alice = Document::new(ReplicaId::from_u128(1), &json!({"note": "grey"})).unwrap();
//! let mut bob = Document::new(ReplicaId::from_u128(2), &json!({"note": "grey"})).unwrap();
//!
//! alice.root().field("note").unwrap().unwrap().push_str(" cat").unwrap();
//! for op in alice.drain_outbox() {
//!     bob.receive(&op).unwrap();
//! }
//! assert_eq!(bob.value(), json!({"note": "grey cat"}));
//! ```

pub mod address;
pub mod context;
pub mod crdt;
pub mod document;
pub mod error;
pub mod key;
pub mod wrapper;

pub use address::Address;
pub use address::Hop;
pub use address::Slot;
pub use crdt::Instruction;
pub use crdt::Operation;
pub use crdt::Tree;
pub use document::Document;
pub use error::Error;
pub use error::Result;
pub use key::Blake3Key;
pub use key::ContentKey;
pub use key::Key;
pub use key::ReplicaId;
pub use wrapper::Wrapper;
