//! Container-style access to a node.
//!
//! A [`Wrapper`] never mutates the tree itself. Every edit becomes an
//! [`Operation`] relative to the wrapped node and is handed to an [`OpSink`].
//! Wrappers for children are built on a [`Prefixed`] sink that re-addresses
//! each operation from the child to its parent before passing it on, so an
//! edit made several levels down reaches the document already addressed from
//! the root.

use serde_json::Value;

use crate::address::Address;
use crate::context::Context;
use crate::context::Delta;
use crate::context::ListContext;
use crate::context::ListEdit;
use crate::context::MapContext;
use crate::context::MapEdit;
use crate::context::NumberContext;
use crate::context::SingleContext;
use crate::context::StringContext;
use crate::context::StringEdit;
use crate::crdt::node::NodeKind;
use crate::crdt::node::NodeType;
use crate::crdt::op::Operation;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;

/// Where wrapper edits go.
pub trait OpSink {
    fn tree(&self) -> &Tree;

    /// Take an operation addressed relative to this sink's node.
    fn sink(&mut self, op: Operation) -> Result<()>;

    /// A string no other edit in the document will ever use, for number
    /// deltas.
    fn unique(&mut self) -> String;
}

impl<T: OpSink + ?Sized> OpSink for &mut T {
    fn tree(&self) -> &Tree {
        return (**self).tree();
    }

    fn sink(&mut self, op: Operation) -> Result<()> {
        return (**self).sink(op);
    }

    fn unique(&mut self) -> String {
        return (**self).unique();
    }
}

/// A sink for a child node: prefixes operations with the child's address
/// and forwards them to the parent's sink.
pub struct Prefixed<'b> {
    parent: &'b mut dyn OpSink,
    prefix: Address,
}

impl<'b> Prefixed<'b> {
    pub fn new(parent: &'b mut dyn OpSink, prefix: Address) -> Prefixed<'b> {
        return Prefixed { parent, prefix };
    }
}

impl OpSink for Prefixed<'_> {
    fn tree(&self) -> &Tree {
        return self.parent.tree();
    }

    fn sink(&mut self, op: Operation) -> Result<()> {
        return self.parent.sink(self.prefix.clone() + op);
    }

    fn unique(&mut self) -> String {
        return self.parent.unique();
    }
}

pub struct Wrapper<'a> {
    sink: Box<dyn OpSink + 'a>,
    node: NodeId,
}

impl<'a> Wrapper<'a> {
    pub fn new(sink: Box<dyn OpSink + 'a>, node: NodeId) -> Wrapper<'a> {
        return Wrapper { sink, node };
    }

    pub fn node(&self) -> NodeId {
        return self.node;
    }

    pub fn node_type(&self) -> NodeType {
        return self.tree().node(self.node).node_type();
    }

    pub fn tree(&self) -> &Tree {
        return self.sink.tree();
    }

    /// The plain value of the wrapped node.
    pub fn value(&self) -> Value {
        return self.tree().flatten(self.node);
    }

    /// Visible characters, elements or fields.
    pub fn len(&self) -> Result<usize> {
        let tree = self.tree();
        return match tree.node(self.node).kind() {
            NodeKind::String(_) | NodeKind::List(_) => Ok(tree.visible_len(self.node)),
            NodeKind::Map(_) => Ok(self.keys()?.len()),
            _ => Err(Error::WrongType {
                expected: NodeType::List,
                found: self.node_type(),
            }),
        };
    }

    pub fn is_empty(&self) -> Result<bool> {
        return Ok(self.len()? == 0);
    }

    fn child(&mut self, prefix: Address, node: NodeId) -> Wrapper<'_> {
        let sink = Prefixed::new(&mut *self.sink, prefix);
        return Wrapper::new(Box::new(sink), node);
    }

    fn send(&mut self, op: Operation) -> Result<()> {
        if op.is_empty() {
            return Ok(());
        }
        return self.sink.sink(op);
    }

    /// Insert text into a string at a flattened character index.
    pub fn insert_str(&mut self, position: usize, text: &str) -> Result<()> {
        let edit = StringEdit::insert(position, text);
        let op = StringContext::compute(self.tree(), self.node, edit)?;
        return self.send(op);
    }

    pub fn push_str(&mut self, text: &str) -> Result<()> {
        let end = self.tree().visible_len(self.node);
        return self.insert_str(end, text);
    }

    /// Insert elements into a list so the first lands at `position`.
    pub fn insert(&mut self, position: usize, values: Vec<Value>) -> Result<()> {
        let op = ListContext::compute(self.tree(), self.node, ListEdit::insert(position, values))?;
        return self.send(op);
    }

    pub fn append(&mut self, value: Value) -> Result<()> {
        let end = self.tree().visible_len(self.node);
        return self.insert(end, vec![value]);
    }

    /// Delete `len` characters of a string or elements of a list.
    pub fn delete(&mut self, position: usize, len: usize) -> Result<()> {
        let tree = self.tree();
        let op = match tree.node(self.node).node_type() {
            NodeType::String => {
                StringContext::compute(tree, self.node, StringEdit::delete(position, len))?
            }
            NodeType::List => {
                ListContext::compute(tree, self.node, ListEdit::delete(position, len))?
            }
            found => {
                return Err(Error::WrongType {
                    expected: NodeType::List,
                    found,
                });
            }
        };
        return self.send(op);
    }

    /// Replace list element `position`.
    pub fn replace(&mut self, position: usize, value: Value) -> Result<()> {
        let op = ListContext::compute(self.tree(), self.node, ListEdit::Set { position, value })?;
        return self.send(op);
    }

    /// A wrapper for list element `index`.
    pub fn item(&mut self, index: usize) -> Result<Wrapper<'_>> {
        let (address, node) = ListContext::element(self.tree(), self.node, index)?;
        return Ok(self.child(address, node));
    }

    /// The plain value of map field `name`, `None` if unset or null.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let tree = self.tree();
        let value = MapContext::value(tree, self.node, name)?.map(|(_, node)| tree.flatten(node));
        return Ok(value.filter(|value| !value.is_null()));
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let op = MapContext::compute(self.tree(), self.node, MapEdit::set(name, value))?;
        return self.send(op);
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let op = MapContext::compute(self.tree(), self.node, MapEdit::remove(name))?;
        return self.send(op);
    }

    /// A wrapper for the value of map field `name`.
    pub fn field(&mut self, name: &str) -> Result<Option<Wrapper<'_>>> {
        return match MapContext::value(self.tree(), self.node, name)? {
            Some((address, node)) => Ok(Some(self.child(address, node))),
            None => Ok(None),
        };
    }

    /// Fields with a non-null value, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let tree = self.tree();
        tree.expect_map(self.node)?;
        let Value::Object(fields) = tree.flatten(self.node) else {
            return Ok(Vec::new());
        };
        return Ok(fields.keys().cloned().collect());
    }

    /// Overwrite the value of a single node.
    pub fn assign(&mut self, value: Value) -> Result<()> {
        let op = SingleContext::compute(self.tree(), self.node, value)?;
        return self.send(op);
    }

    /// A wrapper for the value a single node currently shows.
    pub fn inner(&mut self) -> Result<Option<Wrapper<'_>>> {
        self.tree().expect(self.node, NodeType::Single)?;
        return match SingleContext::value(self.tree(), self.node) {
            Some((address, node)) => Ok(Some(self.child(address, node))),
            None => Ok(None),
        };
    }

    /// Add `amount` to a number.
    pub fn add(&mut self, amount: i64) -> Result<()> {
        self.tree().expect(self.node, NodeType::Number)?;
        let delta = Delta {
            amount,
            unique: self.sink.unique(),
        };
        let op = NumberContext::compute(self.tree(), self.node, delta)?;
        return self.send(op);
    }
}
