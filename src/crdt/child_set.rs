//! The keyed children competing for one slot of a node.
//!
//! Children are ordered by key alone, so every replica enumerates a slot the
//! same way no matter when each child arrived. The highest key is the
//! `head`, which is what "latest wins" readers (single and map nodes) pick;
//! sequence readers enumerate every child, lowest key first.

use std::collections::BTreeMap;

use crate::crdt::node::NodeType;
use crate::crdt::tree::NodeId;
use crate::error::Error;
use crate::error::Result;
use crate::error::UnsupportedInstructionError;
use crate::key::Key;

/// Which node types a slot admits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepts {
    Any,
    Only(NodeType),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildSet {
    children: BTreeMap<Key, NodeId>,
    /// When set, the only key this slot may ever hold.
    limit: Option<Key>,
    accepts: Accepts,
}

impl ChildSet {
    /// A slot that admits any number of children of any type.
    pub fn any() -> ChildSet {
        return ChildSet {
            children: BTreeMap::new(),
            limit: None,
            accepts: Accepts::Any,
        };
    }

    /// A slot that admits any number of children of one type.
    pub fn only(node_type: NodeType) -> ChildSet {
        return ChildSet {
            children: BTreeMap::new(),
            limit: None,
            accepts: Accepts::Only(node_type),
        };
    }

    /// A slot that admits one child of one type, under one key.
    pub fn limited(key: Key, node_type: NodeType) -> ChildSet {
        return ChildSet {
            children: BTreeMap::new(),
            limit: Some(key),
            accepts: Accepts::Only(node_type),
        };
    }

    /// Check that a child of `node_type` keyed `key` may live here.
    ///
    /// `owner` is the type of the node holding this slot, for error messages.
    pub fn admit(&self, owner: NodeType, key: &Key, node_type: NodeType) -> Result<()> {
        if let Accepts::Only(expected) = self.accepts {
            if expected != node_type {
                return Err(UnsupportedInstructionError::Unputable {
                    node: owner,
                    reason: format!("slot takes {} children, not {}", expected, node_type),
                }
                .into());
            }
        }
        if let Some(limit) = &self.limit {
            if limit != key {
                return Err(Error::KeyMismatch {
                    expected: limit.to_string(),
                    actual: key.to_string(),
                });
            }
        }
        return Ok(());
    }

    /// File a child under its own key. Callers check [`ChildSet::admit`] first.
    pub(crate) fn insert(&mut self, key: Key, child: NodeId) {
        self.children.insert(key, child);
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<NodeId> {
        return self.children.remove(key);
    }

    pub fn get(&self, key: &Key) -> Option<NodeId> {
        return self.children.get(key).copied();
    }

    pub fn contains(&self, key: &Key) -> bool {
        return self.children.contains_key(key);
    }

    /// The highest-sorted child.
    pub fn head(&self) -> Option<(&Key, NodeId)> {
        return self.children.iter().next_back().map(|(key, id)| (key, *id));
    }

    /// The lowest-sorted child.
    pub fn tail(&self) -> Option<(&Key, NodeId)> {
        return self.children.iter().next().map(|(key, id)| (key, *id));
    }

    /// Children in ascending key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, NodeId)> + '_ {
        return self.children.iter().map(|(key, id)| (key, *id));
    }

    pub fn len(&self) -> usize {
        return self.children.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.children.is_empty();
    }
}
