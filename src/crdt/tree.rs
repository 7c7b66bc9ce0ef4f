//! The node arena.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. Because the
//! tree only ever grows, an id stays valid for the life of the tree: a
//! rolled back operation only pops the nodes it pushed itself.
//!
//! Mutation goes through [`Tree::put`] and [`Tree::bury`]. While a journal is
//! open (see [`Tree::begin`]) each mutation records how to undo itself and
//! its events are held back until [`Tree::commit`].
//!
//! Typing at the end of a string nests each insert one level below the last,
//! so a sequence can be thousands of nodes deep. Nothing here recurses along
//! that chain: every string and list caches its flattened length, and reads
//! walk the chain with an explicit stack.

use std::fmt;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::address::Hop;
use crate::address::Slot;
use crate::crdt::event::Event;
use crate::crdt::event::EventGrid;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::node::Node;
use crate::crdt::node::NodeKind;
use crate::crdt::node::NodeType;
use crate::crdt::node::SingleNode;
use crate::crdt::op::Operation;
use crate::error::Error;
use crate::error::Result;
use crate::error::UnsupportedInstructionError;
use crate::key::Blake3Key;
use crate::key::ContentKey;
use crate::key::Key;

/// Index of a node in its tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

#[derive(Clone, Debug)]
enum Undo {
    /// A node was pushed onto the arena.
    Created,
    Adopted { parent: NodeId, slot: Slot, key: Key },
    Buried { node: NodeId, position: usize },
    /// A cached visible length changed from `len`.
    Resized { node: NodeId, len: usize },
}

#[derive(Clone, Debug, Default)]
struct Journal {
    undo: Vec<Undo>,
    events: Vec<Event>,
}

/// Work left while flattening a sequence: a node still to expand, or an
/// item ready to emit.
enum Pending<T> {
    Node(NodeId),
    Item(T),
}

#[derive(Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    hasher: Arc<dyn ContentKey>,
    journal: Option<Journal>,
    events: EventGrid,
}

impl Tree {
    /// Build a tree whose root holds `value`, keyed with [`Blake3Key`].
    pub fn new(value: &Value) -> Result<Tree> {
        return Tree::with_hasher(value, Arc::new(Blake3Key));
    }

    /// Build a tree whose root holds `value`, keyed with `hasher`.
    pub fn with_hasher(value: &Value, hasher: Arc<dyn ContentKey>) -> Result<Tree> {
        let leaf = Leaf::from_value(value, hasher.as_ref())?;
        let mut tree = Tree::from_leaf(&leaf, hasher);
        let op = Operation::structure_children(tree.hasher(), value)?;
        let root = tree.root;
        op.apply(&mut tree, root)?;
        return Ok(tree);
    }

    /// A tree holding a single childless root.
    pub fn from_leaf(leaf: &Leaf, hasher: Arc<dyn ContentKey>) -> Tree {
        let key = leaf.key(hasher.as_ref());
        return Tree {
            nodes: vec![Node::from_leaf(leaf, key, None)],
            root: NodeId(0),
            hasher,
            journal: None,
            events: EventGrid::new(),
        };
    }

    pub fn root(&self) -> NodeId {
        return self.root;
    }

    pub fn hasher(&self) -> &dyn ContentKey {
        return self.hasher.as_ref();
    }

    /// Number of nodes ever created, history included.
    pub fn size(&self) -> usize {
        return self.nodes.len();
    }

    pub fn node(&self, id: NodeId) -> &Node {
        return &self.nodes[id.0 as usize];
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        return &mut self.nodes[id.0 as usize];
    }

    pub fn events(&self) -> &EventGrid {
        return &self.events;
    }

    pub fn events_mut(&mut self) -> &mut EventGrid {
        return &mut self.events;
    }

    /// Fail with `WrongType` unless `id` is a node of type `expected`.
    pub fn expect(&self, id: NodeId, expected: NodeType) -> Result<()> {
        let found = self.node(id).node_type();
        if found != expected {
            return Err(Error::WrongType { expected, found });
        }
        return Ok(());
    }

    pub fn expect_map(&self, id: NodeId) -> Result<()> {
        return self.expect(id, NodeType::Map);
    }

    /// Follow one hop. `Ok(None)` means the hop is well formed for this node
    /// but no such child exists (yet).
    pub fn get(&self, id: NodeId, hop: &Hop) -> Result<Option<NodeId>> {
        let node = self.node(id);
        let ungetable = |reason: &str| -> Error {
            return UnsupportedInstructionError::Ungetable {
                node: node.node_type(),
                reason: reason.to_string(),
            }
            .into();
        };
        return match (node.kind(), hop) {
            (NodeKind::Trinary(_), _) => Err(ungetable("trinary nodes have no children")),
            (NodeKind::Map(_), Hop::Jump(field)) => Ok(node
                .slot(&Slot::Field(field.clone()))
                .and_then(|set| set.head())
                .map(|(_, child)| child)),
            (NodeKind::Map(_), Hop::Child { .. }) => {
                Err(ungetable("map fields are entered by name"))
            }
            (_, Hop::Jump(_)) => Err(ungetable("only maps have named fields")),
            (_, Hop::Child { position, key }) => {
                Ok(node.slot(&Slot::Index(*position)).and_then(|set| set.get(key)))
            }
        };
    }

    /// Build a node from `leaf` and adopt it into `slot` of `parent`.
    ///
    /// Returns `None` without touching anything if a child with the same key
    /// is already there.
    pub fn put(&mut self, parent: NodeId, slot: &Slot, leaf: &Leaf) -> Result<Option<NodeId>> {
        let key = leaf.key(self.hasher());
        self.node(parent).check_put(slot, &key, leaf.node_type())?;
        if self.node(parent).slot(slot).is_some_and(|set| set.contains(&key)) {
            tracing::trace!(parent = parent.0, %slot, %key, "child already present");
            return Ok(None);
        }

        let child = NodeId(self.nodes.len() as u32);
        let mut node = Node::from_leaf(leaf, key.clone(), Some(parent));
        node.inline = self.node(parent).inlines(slot);
        let (inline, len) = (node.inline, node.visible);
        self.nodes.push(node);
        match self.node_mut(parent).slot_mut(slot) {
            Some(set) => set.insert(key.clone(), child),
            None => {
                self.nodes.pop();
                return Err(UnsupportedInstructionError::Unputable {
                    node: self.node(parent).node_type(),
                    reason: format!("no slot {}", slot),
                }
                .into());
            }
        }

        self.record(Undo::Created);
        self.record(Undo::Adopted {
            parent,
            slot: slot.clone(),
            key,
        });
        if inline && len > 0 {
            self.resize(parent, len as isize);
        }
        self.emit(Event::Insert {
            node: parent,
            position: slot.clone(),
            child,
        });
        for ancestor in self.ancestors(parent) {
            self.emit(Event::ChildInsert {
                ancestor,
                node: parent,
            });
        }
        return Ok(Some(child));
    }

    /// Tombstone `position` of a string or list node.
    ///
    /// Returns false if it was already tombstoned.
    pub fn bury(&mut self, id: NodeId, position: usize) -> Result<bool> {
        self.node(id).check_delete(position, position)?;
        let changed = match self.node_mut(id).tombstones_mut() {
            Some(tombstones) => tombstones.bury(position),
            None => false,
        };
        if !changed {
            tracing::trace!(node = id.0, position, "already deleted");
            return Ok(false);
        }

        self.record(Undo::Buried { node: id, position });
        self.resize(id, -1);
        self.emit(Event::Delete { node: id, position });
        for ancestor in self.ancestors(id) {
            self.emit(Event::ChildDelete { ancestor, node: id });
        }
        return Ok(true);
    }

    /// Change the visible length of `from` by `delta`, and of every ancestor
    /// its sequence is inlined into.
    fn resize(&mut self, from: NodeId, delta: isize) {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.node_mut(id);
            let len = node.visible;
            node.visible = len.wrapping_add_signed(delta);
            current = if node.inline { node.parent } else { None };
            self.record(Undo::Resized { node: id, len });
        }
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.node(id).parent();
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.node(parent).parent();
        }
        return ancestors;
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = &mut self.journal {
            journal.undo.push(undo);
        }
    }

    fn emit(&mut self, event: Event) {
        match &mut self.journal {
            Some(journal) => journal.events.push(event),
            None => self.events.happen(event),
        }
    }

    /// Start journaling mutations so they can be rolled back.
    pub(crate) fn begin(&mut self) {
        self.journal = Some(Journal::default());
    }

    /// Keep everything since [`Tree::begin`] and deliver its events.
    pub(crate) fn commit(&mut self) {
        if let Some(journal) = self.journal.take() {
            for event in journal.events {
                self.events.happen(event);
            }
        }
    }

    /// Undo everything since [`Tree::begin`], newest first, and drop its events.
    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.undo.into_iter().rev() {
            match undo {
                Undo::Created => {
                    self.nodes.pop();
                }
                Undo::Adopted { parent, slot, key } => {
                    if let Some(set) = self.node_mut(parent).slot_mut(&slot) {
                        set.remove(&key);
                    }
                }
                Undo::Buried { node, position } => {
                    if let Some(tombstones) = self.node_mut(node).tombstones_mut() {
                        tombstones.unbury(position);
                    }
                }
                Undo::Resized { node, len } => self.node_mut(node).visible = len,
            }
        }
    }

    /// The most recent link of a single node's overwrite chain.
    pub fn last_link(&self, single: NodeId) -> NodeId {
        let mut link = single;
        while let NodeKind::Single(node) = self.node(link).kind() {
            match node.next.head() {
                Some((_, next)) => link = next,
                None => break,
            }
        }
        return link;
    }

    /// The value a single node currently shows: the head of its last link.
    pub fn single_value(&self, single: NodeId) -> Option<NodeId> {
        let link = self.last_link(single);
        return match self.node(link).kind() {
            NodeKind::Single(node) => node.values.head().map(|(_, value)| value),
            _ => None,
        };
    }

    /// The single node behind a map field, if the field has been set.
    pub fn field(&self, map: NodeId, name: &str) -> Result<Option<NodeId>> {
        return self.get(map, &Hop::Jump(name.to_string()));
    }

    /// How many items a string or list contributes to its flattened parent.
    pub fn visible_len(&self, id: NodeId) -> usize {
        let node = self.node(id);
        return match node.kind() {
            NodeKind::String(_) | NodeKind::List(_) => node.visible,
            _ => 1,
        };
    }

    /// The number a number node adds up to, deltas included.
    pub fn total(&self, id: NodeId) -> i64 {
        return match self.node(id).kind() {
            NodeKind::Number(node) => node
                .deltas
                .iter()
                .fold(node.literal, |sum, (_, delta)| sum.wrapping_add(self.total(delta))),
            _ => 0,
        };
    }

    /// The plain value of the subtree at `id`.
    pub fn flatten(&self, id: NodeId) -> Value {
        return match self.node(id).kind() {
            NodeKind::String(_) => Value::String(self.flatten_text(id)),
            NodeKind::List(_) => Value::Array(self.flatten_items(id)),
            NodeKind::Map(node) => {
                let mut fields = Map::new();
                for (name, set) in &node.slots {
                    let Some((_, single)) = set.head() else {
                        continue;
                    };
                    let value = self.flatten(single);
                    if !value.is_null() {
                        fields.insert(name.clone(), value);
                    }
                }
                Value::Object(fields)
            }
            NodeKind::Number(_) => Value::from(self.total(id)),
            NodeKind::Single(_) => match self.single_value(id) {
                Some(value) => self.flatten(value),
                None => Value::Null,
            },
            NodeKind::Trinary(node) => match node.0 {
                Some(flag) => Value::Bool(flag),
                None => Value::Null,
            },
        };
    }

    fn flatten_text(&self, id: NodeId) -> String {
        let mut out = String::with_capacity(self.visible_len(id));
        let mut pending = vec![Pending::Node(id)];
        while let Some(next) = pending.pop() {
            let id = match next {
                Pending::Node(id) => id,
                Pending::Item(c) => {
                    out.push(c);
                    continue;
                }
            };
            let NodeKind::String(node) = self.node(id).kind() else {
                continue;
            };
            // Pushed back to front so they pop in flatten order.
            for (i, set) in node.slots.iter().enumerate().rev() {
                if i < node.text.len() && !node.deleted.is_deleted(i) {
                    pending.push(Pending::Item(node.text[i]));
                }
                pending.extend(set.iter().rev().map(|(_, child)| Pending::Node(child)));
            }
        }
        return out;
    }

    fn flatten_items(&self, id: NodeId) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.visible_len(id));
        let mut pending = vec![Pending::Node(id)];
        while let Some(next) = pending.pop() {
            let id = match next {
                Pending::Node(id) => id,
                Pending::Item(value) => {
                    out.push(value);
                    continue;
                }
            };
            let NodeKind::List(node) = self.node(id).kind() else {
                continue;
            };
            for i in (0..=node.elements.len()).rev() {
                if i < node.elements.len() && !node.deleted.is_deleted(i) {
                    let value = match node.slots[i * 2 + 1].head() {
                        Some((_, value)) => self.flatten(value),
                        None => Value::Null,
                    };
                    pending.push(Pending::Item(value));
                }
                let inserted = node.slots[i * 2].iter().rev();
                pending.extend(inserted.map(|(_, child)| Pending::Node(child)));
            }
        }
        return out;
    }

    /// A snapshot of the whole tree, history included.
    pub fn proto(&self) -> Value {
        let root = self.node(self.root);
        let leaf = root.leaf();
        let mut head = vec![Value::from(leaf.node_type().code())];
        head.extend(leaf.args());
        let op = Operation::from_children(self, self.root);
        return json!({
            "type": "tree",
            "root": head,
            "instructions": op.instructions().iter().map(Instruction::proto).collect::<Vec<_>>(),
        });
    }

    /// Rebuild a tree from [`Tree::proto`], keyed with [`Blake3Key`].
    pub fn reconstruct(proto: &Value) -> Result<Tree> {
        return Tree::reconstruct_with(proto, Arc::new(Blake3Key));
    }

    pub fn reconstruct_with(proto: &Value, hasher: Arc<dyn ContentKey>) -> Result<Tree> {
        let malformed = || Error::MalformedInstruction("not a tree snapshot".to_string());
        if proto.get("type").and_then(Value::as_str) != Some("tree") {
            return Err(malformed());
        }
        let head = proto.get("root").and_then(Value::as_array).ok_or_else(malformed)?;
        let (code, args) = head.split_first().ok_or_else(malformed)?;
        let node_type = code.as_u64().and_then(NodeType::from_code).ok_or_else(malformed)?;
        let leaf = Leaf::from_args(node_type, args)?;

        let mut instructions = Vec::new();
        let raw = proto.get("instructions").and_then(Value::as_array).ok_or_else(malformed)?;
        for instruction in raw {
            instructions.push(Instruction::from_proto(instruction)?);
        }

        let mut tree = Tree::from_leaf(&leaf, hasher);
        let root = tree.root;
        Operation::new(instructions).apply(&mut tree, root)?;
        return Ok(tree);
    }

    /// Bring in everything `other` has that this tree lacks.
    ///
    /// Both trees must share a root key, i.e. be replicas of one document.
    pub fn merge(&mut self, other: &Tree) -> Result<()> {
        let ours = self.node(self.root).key();
        let theirs = other.node(other.root).key();
        if ours != theirs {
            return Err(Error::RootMismatch {
                ours: ours.to_string(),
                theirs: theirs.to_string(),
            });
        }
        let root = self.root;
        Operation::from_children(other, other.root).apply(self, root)?;
        return Ok(());
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Tree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("value", &self.flatten(self.root))
            .finish();
    }
}
