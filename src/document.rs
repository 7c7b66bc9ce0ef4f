//! A replica of one document.
//!
//! A document owns its tree, the id it stamps its own number deltas with and
//! an outbox of the operations it produced locally. It does no networking;
//! whoever moves operations between replicas drains the outbox on one side
//! and calls [`Document::receive`] on the other, re-queueing whatever comes
//! back [`Error::NotReady`].

use serde_json::Value;

use crate::crdt::event::EventGrid;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::node::Unique;
use crate::crdt::op::Operation;
use crate::crdt::primitives::LamportClock;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;
use crate::key::ReplicaId;
use crate::wrapper::OpSink;
use crate::wrapper::Wrapper;

#[derive(Debug)]
pub struct Document {
    tree: Tree,
    replica: ReplicaId,
    clock: LamportClock,
    outbox: Vec<Operation>,
}

impl Document {
    pub fn new(replica: ReplicaId, value: &Value) -> Result<Document> {
        return Ok(Document::from_tree(replica, Tree::new(value)?));
    }

    /// Join an existing document, e.g. one rebuilt with
    /// [`Tree::reconstruct`] from another replica's snapshot.
    pub fn from_tree(replica: ReplicaId, tree: Tree) -> Document {
        return Document {
            tree,
            replica,
            clock: LamportClock::new(),
            outbox: Vec::new(),
        };
    }

    pub fn replica(&self) -> ReplicaId {
        return self.replica;
    }

    pub fn tree(&self) -> &Tree {
        return &self.tree;
    }

    pub fn value(&self) -> Value {
        return self.tree.flatten(self.tree.root());
    }

    /// Subscribe to tree events here.
    pub fn events_mut(&mut self) -> &mut EventGrid {
        return self.tree.events_mut();
    }

    /// Edit the document. Edits apply immediately and land in the outbox.
    pub fn root(&mut self) -> Wrapper<'_> {
        let root = self.tree.root();
        return Wrapper::new(Box::new(self), root);
    }

    /// Apply an operation from another replica.
    ///
    /// Operations whose dependencies have not arrived yet are refused with
    /// the addresses they are waiting on; the tree is left untouched.
    pub fn receive(&mut self, op: &Operation) -> Result<()> {
        let root = self.tree.root();
        let missing = op.missing(&self.tree, root);
        if !missing.is_empty() {
            tracing::debug!(
                replica = %self.replica,
                clock = self.clock.time(),
                missing = missing.len(),
                "deferring remote operation"
            );
            return Err(Error::NotReady { missing });
        }
        op.apply(&mut self.tree, root)?;
        for instruction in op.instructions() {
            if let Instruction::Insert { leaf, .. } = instruction {
                if let Some(seq) = stamp(leaf) {
                    self.clock.update(seq);
                }
            }
        }
        return Ok(());
    }

    /// Everything applied locally since the last drain, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<Operation> {
        return std::mem::take(&mut self.outbox);
    }

    /// Bring in everything another replica's tree has.
    pub fn merge(&mut self, other: &Tree) -> Result<()> {
        return self.tree.merge(other);
    }
}

impl OpSink for Document {
    fn tree(&self) -> &Tree {
        return &self.tree;
    }

    fn sink(&mut self, op: Operation) -> Result<()> {
        let root = self.tree.root();
        op.apply(&mut self.tree, root)?;
        self.outbox.push(op);
        return Ok(());
    }

    fn unique(&mut self) -> String {
        let seq = self.clock.tick();
        return format!("{}:{}", self.replica, seq);
    }
}

/// The clock reading in a `"<replica>:<seq>"` number delta id.
fn stamp(leaf: &Leaf) -> Option<u64> {
    let Leaf::Number {
        unique: Unique::Text(text),
        ..
    } = leaf
    else {
        return None;
    };
    let (_, seq) = text.rsplit_once(':')?;
    return seq.parse().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use serde_json::json;

    fn pair(value: Value) -> (Document, Document) {
        let a = Document::new(ReplicaId::from_u128(1), &value).unwrap();
        let b = Document::new(ReplicaId::from_u128(2), &value).unwrap();
        return (a, b);
    }

    #[test]
    fn edits_reach_the_other_replica() {
        let (mut a, mut b) = pair(json!({"title": "draft", "count": 0}));
        {
            let mut root = a.root();
            root.field("title").unwrap().unwrap().push_str(" two").unwrap();
            root.field("count").unwrap().unwrap().add(5).unwrap();
        }
        for op in a.drain_outbox() {
            b.receive(&op).unwrap();
        }
        assert_eq!(b.value(), json!({"title": "draft two", "count": 5}));
        assert!(a.drain_outbox().is_empty());
    }

    #[test]
    fn out_of_order_delivery_is_refused() {
        let (mut a, mut b) = pair(json!({}));
        a.root().set("list", json!([])).unwrap();
        {
            let mut root = a.root();
            let mut list = root.field("list").unwrap().unwrap();
            list.append(json!("x")).unwrap();
        }
        let ops = a.drain_outbox();
        assert_eq!(ops.len(), 2);

        let err = b.receive(&ops[1]).unwrap_err();
        let Error::NotReady { missing } = err else {
            panic!("expected NotReady, got {:?}", err);
        };
        assert_eq!(missing.len(), 1);
        assert!(!missing.contains(&Address::root()));
        assert_eq!(b.value(), json!({}));

        b.receive(&ops[0]).unwrap();
        b.receive(&ops[1]).unwrap();
        assert_eq!(b.value(), a.value());
    }

    #[test]
    fn clock_moves_past_received_deltas() {
        let (mut a, mut b) = pair(json!(0));
        for _ in 0..5 {
            a.root().add(1).unwrap();
        }
        for op in a.drain_outbox() {
            b.receive(&op).unwrap();
        }
        assert_eq!(b.value(), json!(5));
        assert!(b.clock.time() > 5);

        // Ids that do not carry a clock reading are ignored.
        assert_eq!(stamp(&Leaf::Number { literal: 1, unique: "x".into() }), None);
        assert_eq!(stamp(&Leaf::Number { literal: 1, unique: Unique::Integer(9) }), None);
        assert_eq!(stamp(&Leaf::Number { literal: 1, unique: "ab:12".into() }), Some(12));
    }

    #[test]
    fn uniques_never_repeat() {
        let mut doc = Document::new(ReplicaId::from_u128(9), &json!(0)).unwrap();
        let first = doc.unique();
        let second = doc.unique();
        assert_ne!(first, second);
        assert!(first.ends_with(":1"));
    }
}
