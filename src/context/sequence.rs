//! String and list editing, and the index tracing both rely on.
//!
//! Callers speak in indices into the flattened value. The tree stores a
//! sequence as its original items plus, before each item, a slot of inserted
//! children, each of which is itself a sequence. Tracing walks that layout in
//! exactly the order flattening does (slot children by ascending key, then
//! the item unless tombstoned) so an index means the same thing on every
//! replica that holds the same tree.

use serde_json::Value;

use crate::address::Address;
use crate::address::Hop;
use crate::address::Slot;
use crate::context::Context;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::node::NodeKind;
use crate::crdt::node::NodeType;
use crate::crdt::node::Tombstones;
use crate::crdt::op::Operation;
use crate::crdt::op::ranges_of;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;

/// A physical position: a node (relative address) and a position in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    pub address: Address,
    pub position: usize,
}

/// Item count, slot stride and tombstones of a string or list node.
fn layout(tree: &Tree, id: NodeId) -> Option<(usize, usize, &Tombstones)> {
    return match tree.node(id).kind() {
        NodeKind::String(node) => Some((node.text.len(), 1, &node.deleted)),
        NodeKind::List(node) => Some((node.elements.len(), 2, &node.deleted)),
        _ => None,
    };
}

/// Where to insert so the new content starts at flattened `index`.
///
/// The position in the trace is a slot. An index that falls on a boundary
/// descends into the earliest inserted child that ends there.
pub fn trace_index(tree: &Tree, id: NodeId, index: usize) -> Option<Trace> {
    let mut address = Address::root();
    let mut current = id;
    let mut remaining = index;
    'node: loop {
        let (count, stride, tombstones) = layout(tree, current)?;
        let node = tree.node(current);
        for item in 0..=count {
            let slot = item * stride;
            let set = node.slot(&Slot::Index(slot))?;
            if remaining == 0 && set.is_empty() {
                return Some(Trace {
                    address,
                    position: slot,
                });
            }
            for (key, child) in set.iter() {
                let len = tree.visible_len(child);
                if remaining <= len {
                    address.append(Hop::Child {
                        position: slot,
                        key: key.clone(),
                    });
                    current = child;
                    continue 'node;
                }
                remaining -= len;
            }
            if item < count && !tombstones.is_deleted(item) {
                remaining -= 1;
            }
        }
        return None;
    }
}

/// The item shown at flattened `index`.
///
/// The position in the trace is an item index (a character or an element),
/// which is also its tombstone position.
pub fn trace_elem(tree: &Tree, id: NodeId, index: usize) -> Option<Trace> {
    let mut address = Address::root();
    let mut current = id;
    let mut remaining = index;
    'node: loop {
        let (count, stride, tombstones) = layout(tree, current)?;
        let node = tree.node(current);
        for item in 0..=count {
            let slot = item * stride;
            for (key, child) in node.slot(&Slot::Index(slot))?.iter() {
                let len = tree.visible_len(child);
                if remaining < len {
                    address.append(Hop::Child {
                        position: slot,
                        key: key.clone(),
                    });
                    current = child;
                    continue 'node;
                }
                remaining -= len;
            }
            if item < count && !tombstones.is_deleted(item) {
                if remaining == 0 {
                    return Some(Trace {
                        address,
                        position: item,
                    });
                }
                remaining -= 1;
            }
        }
        return None;
    }
}

fn insertion(tree: &Tree, id: NodeId, position: usize) -> Result<Trace> {
    return trace_index(tree, id, position).ok_or_else(|| Error::IndexOutOfRange {
        position,
        length: tree.visible_len(id),
    });
}

/// Tombstone `len` items starting at flattened `position`, one delete per
/// node touched.
fn deletion(tree: &Tree, id: NodeId, position: usize, len: usize) -> Result<Operation> {
    let end = position.checked_add(len).ok_or_else(|| Error::IndexOutOfRange {
        position,
        length: tree.visible_len(id),
    })?;
    let mut grouped: Vec<(Address, Vec<usize>)> = Vec::new();
    for index in position..end {
        let trace = trace_elem(tree, id, index).ok_or_else(|| Error::IndexOutOfRange {
            position: index,
            length: tree.visible_len(id),
        })?;
        match grouped.iter_mut().find(|(address, _)| *address == trace.address) {
            Some((_, positions)) => positions.push(trace.position),
            None => grouped.push((trace.address, vec![trace.position])),
        }
    }
    let mut op = Operation::default();
    for (address, mut positions) in grouped {
        positions.sort_unstable();
        op.push(Instruction::delete(address, ranges_of(positions)));
    }
    return Ok(op);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StringEdit {
    Insert { position: usize, text: String },
    Delete { position: usize, len: usize },
}

impl StringEdit {
    pub fn insert(position: usize, text: impl Into<String>) -> StringEdit {
        return StringEdit::Insert {
            position,
            text: text.into(),
        };
    }

    pub fn delete(position: usize, len: usize) -> StringEdit {
        return StringEdit::Delete { position, len };
    }
}

pub struct StringContext;

impl Context for StringContext {
    type Edit = StringEdit;

    fn compute(tree: &Tree, id: NodeId, edit: StringEdit) -> Result<Operation> {
        tree.expect(id, NodeType::String)?;
        return match edit {
            StringEdit::Insert { position, text } => {
                let trace = insertion(tree, id, position)?;
                if text.is_empty() {
                    return Ok(Operation::default());
                }
                let insert = Instruction::insert(
                    Address::root(),
                    Slot::Index(trace.position),
                    Leaf::String(text),
                );
                Ok(trace.address + Operation::new(vec![insert]))
            }
            StringEdit::Delete { position, len } => deletion(tree, id, position, len),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListEdit {
    Insert { position: usize, values: Vec<Value> },
    Delete { position: usize, len: usize },
    /// Replace one element: the old one is deleted, the new one inserted
    /// in its place.
    Set { position: usize, value: Value },
}

impl ListEdit {
    pub fn insert(position: usize, values: Vec<Value>) -> ListEdit {
        return ListEdit::Insert { position, values };
    }

    pub fn delete(position: usize, len: usize) -> ListEdit {
        return ListEdit::Delete { position, len };
    }
}

pub struct ListContext;

impl ListContext {
    /// The node showing element `index` of the list at `id`, with its
    /// address relative to `id`.
    pub fn element(tree: &Tree, id: NodeId, index: usize) -> Result<(Address, NodeId)> {
        tree.expect(id, NodeType::List)?;
        let trace = trace_elem(tree, id, index).ok_or_else(|| Error::IndexOutOfRange {
            position: index,
            length: tree.visible_len(id),
        })?;
        let list = trace.address.resolve(tree, id)?;
        let slot = trace.position * 2 + 1;
        let Some((key, value)) = tree.node(list).slot(&Slot::Index(slot)).and_then(|set| set.head())
        else {
            return Err(Error::Unresolvable {
                address: trace.address,
            });
        };
        let address = trace.address.child(Hop::Child {
            position: slot,
            key: key.clone(),
        });
        return Ok((address, value));
    }
}

impl Context for ListContext {
    type Edit = ListEdit;

    fn compute(tree: &Tree, id: NodeId, edit: ListEdit) -> Result<Operation> {
        tree.expect(id, NodeType::List)?;
        return match edit {
            ListEdit::Insert { position, values } => {
                let trace = insertion(tree, id, position)?;
                if values.is_empty() {
                    return Ok(Operation::default());
                }
                let insert = Operation::from_structure(
                    tree.hasher(),
                    &Value::Array(values),
                    Slot::Index(trace.position),
                )?;
                Ok(trace.address + insert)
            }
            ListEdit::Delete { position, len } => deletion(tree, id, position, len),
            ListEdit::Set { position, value } => {
                let removal = deletion(tree, id, position, 1)?;
                let edit = ListEdit::insert(position, vec![value]);
                let insert = ListContext::compute(tree, id, edit)?;
                Ok(insert + removal)
            }
        };
    }
}
