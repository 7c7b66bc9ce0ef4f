//! Map and single editing.
//!
//! A single node never loses a value. Overwriting appends a new link to its
//! chain (slot 1) and puts the new value in that link's slot 0; readers follow
//! the chain to its end. Concurrent overwrites of the same link create the
//! same `/single` child, so they land side by side in one value slot and the
//! higher key wins there.
//!
//! A map field is a single node, so setting a field is a single overwrite
//! below a field jump. Removing a field overwrites it with null.

use serde_json::Value;

use crate::address::Address;
use crate::address::Hop;
use crate::address::Slot;
use crate::context::Context;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::node::NodeKind;
use crate::crdt::node::NodeType;
use crate::crdt::node::SingleNode;
use crate::crdt::op::Operation;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Result;
use crate::key::Key;

fn next_hop() -> Hop {
    return Hop::Child {
        position: SingleNode::NEXT_SLOT,
        key: Key::single(),
    };
}

pub struct SingleContext;

impl SingleContext {
    /// The last link of the chain starting at `id`, with its address
    /// relative to `id`.
    pub fn last_link(tree: &Tree, id: NodeId) -> (Address, NodeId) {
        let mut address = Address::root();
        let mut link = id;
        while let NodeKind::Single(node) = tree.node(link).kind() {
            match node.next.head() {
                Some((_, next)) => {
                    address.append(next_hop());
                    link = next;
                }
                None => break,
            }
        }
        return (address, link);
    }

    /// The value node currently shown by the single at `id`, with its
    /// address relative to `id`.
    pub fn value(tree: &Tree, id: NodeId) -> Option<(Address, NodeId)> {
        let (address, link) = SingleContext::last_link(tree, id);
        let NodeKind::Single(node) = tree.node(link).kind() else {
            return None;
        };
        let (key, value) = node.values.head()?;
        let address = address.child(Hop::Child {
            position: SingleNode::VALUE_SLOT,
            key: key.clone(),
        });
        return Some((address, value));
    }
}

impl Context for SingleContext {
    type Edit = Value;

    fn compute(tree: &Tree, id: NodeId, value: Value) -> Result<Operation> {
        tree.expect(id, NodeType::Single)?;
        let (address, link) = SingleContext::last_link(tree, id);
        let empty = match tree.node(link).kind() {
            NodeKind::Single(node) => node.values.is_empty(),
            _ => false,
        };
        let slot = Slot::Index(SingleNode::VALUE_SLOT);
        let write = Operation::from_structure(tree.hasher(), &value, slot)?;
        if empty {
            return Ok(address + write);
        }
        let mut op = Operation::new(vec![Instruction::insert(
            Address::root(),
            Slot::Index(SingleNode::NEXT_SLOT),
            Leaf::Single,
        )]);
        op += Address::from_hops([next_hop()]) + write;
        return Ok(address + op);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapEdit {
    Set { key: String, value: Value },
    /// Equivalent to setting the field to null. Removing an absent field
    /// does nothing.
    Remove { key: String },
}

impl MapEdit {
    pub fn set(key: impl Into<String>, value: Value) -> MapEdit {
        return MapEdit::Set {
            key: key.into(),
            value,
        };
    }

    pub fn remove(key: impl Into<String>) -> MapEdit {
        return MapEdit::Remove { key: key.into() };
    }
}

pub struct MapContext;

impl MapContext {
    /// The value node currently shown for field `name`, with its address
    /// relative to the map.
    pub fn value(tree: &Tree, id: NodeId, name: &str) -> Result<Option<(Address, NodeId)>> {
        tree.expect(id, NodeType::Map)?;
        let Some(single) = tree.field(id, name)? else {
            return Ok(None);
        };
        return Ok(SingleContext::value(tree, single).map(|(address, value)| {
            return (Address::from_hops([Hop::Jump(name.to_string())]) + address, value);
        }));
    }
}

impl Context for MapContext {
    type Edit = MapEdit;

    fn compute(tree: &Tree, id: NodeId, edit: MapEdit) -> Result<Operation> {
        tree.expect(id, NodeType::Map)?;
        let (name, value) = match edit {
            MapEdit::Set { key, value } => (key, value),
            MapEdit::Remove { key } => {
                if tree.field(id, &key)?.is_none() {
                    return Ok(Operation::default());
                }
                (key, Value::Null)
            }
        };
        let jump = Address::from_hops([Hop::Jump(name.clone())]);
        return match tree.field(id, &name)? {
            Some(single) => Ok(jump + SingleContext::compute(tree, single, value)?),
            None => {
                let mut op = Operation::new(vec![Instruction::insert(
                    Address::root(),
                    Slot::Field(name),
                    Leaf::Single,
                )]);
                let slot = Slot::Index(SingleNode::VALUE_SLOT);
                op += jump + Operation::from_structure(tree.hasher(), &value, slot)?;
                Ok(op)
            }
        };
    }
}
