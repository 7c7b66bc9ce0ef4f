//! Counter increments.
//!
//! A number is never overwritten in place. Each increment is a child number
//! node under slot 0 and the shown value is the sum. Deltas are keyed by
//! their content, so two increments of the same amount need different
//! `unique` strings or they collapse into one.

use crate::address::Address;
use crate::address::Slot;
use crate::context::Context;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::node::NodeType;
use crate::crdt::op::Operation;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Result;
use crate::key::ReplicaId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    pub amount: i64,
    pub unique: String,
}

impl Delta {
    /// A delta made unique by the replica that issues it and that
    /// replica's clock.
    pub fn new(amount: i64, replica: ReplicaId, seq: u64) -> Delta {
        return Delta {
            amount,
            unique: format!("{}:{}", replica, seq),
        };
    }
}

pub struct NumberContext;

impl Context for NumberContext {
    type Edit = Delta;

    fn compute(tree: &Tree, id: NodeId, delta: Delta) -> Result<Operation> {
        tree.expect(id, NodeType::Number)?;
        let leaf = Leaf::Number {
            literal: delta.amount,
            unique: delta.unique.into(),
        };
        return Ok(Operation::new(vec![Instruction::insert(
            Address::root(),
            Slot::Index(0),
            leaf,
        )]));
    }
}
