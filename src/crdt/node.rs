//! Node variants and the leaves they are built from.
//!
//! A node is created from a [`Leaf`], the immutable payload carried by an
//! insert instruction, and afterwards only grows: children are adopted into
//! slots and slots are tombstoned, but nothing is ever removed.
//!
//! | Variant | Slots | Tombstones |
//! |---------|-------|------------|
//! | string  | `0..=n`, one before each character and one at the end | per character |
//! | list    | `0..=2n`, even = inserted before element `i/2`, odd = its value | per element |
//! | map     | one per field name, each holding one single node | none |
//! | number  | `0`, additive deltas | none |
//! | single  | `0` = values, `1` = the next link in the overwrite chain | none |
//! | trinary | none | none |

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::address::Slot;
use crate::crdt::child_set::ChildSet;
use crate::crdt::tree::NodeId;
use crate::error::Error;
use crate::error::Result;
use crate::error::UnsupportedInstructionError;
use crate::key::ContentKey;
use crate::key::Key;

/// The six node variants. Doubles as the wire code of the matching insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    String,
    Map,
    List,
    Number,
    Single,
    Trinary,
}

impl NodeType {
    /// The instruction code that inserts a node of this type.
    pub fn code(self) -> u64 {
        return match self {
            NodeType::String => 1,
            NodeType::Map => 2,
            NodeType::List => 3,
            NodeType::Number => 4,
            NodeType::Single => 5,
            NodeType::Trinary => 6,
        };
    }

    pub fn from_code(code: u64) -> Option<NodeType> {
        return match code {
            1 => Some(NodeType::String),
            2 => Some(NodeType::Map),
            3 => Some(NodeType::List),
            4 => Some(NodeType::Number),
            5 => Some(NodeType::Single),
            6 => Some(NodeType::Trinary),
            _ => None,
        };
    }

    /// Prefix hashed in front of a value so equal bytes of different types
    /// never share a key.
    fn tag(self) -> u8 {
        return match self {
            NodeType::String => b's',
            NodeType::Map => b'm',
            NodeType::List => b'l',
            NodeType::Number => b'n',
            NodeType::Single => b'/',
            NodeType::Trinary => b't',
        };
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::String => "string",
            NodeType::Map => "map",
            NodeType::List => "list",
            NodeType::Number => "number",
            NodeType::Single => "single",
            NodeType::Trinary => "trinary",
        };
        return f.write_str(name);
    }
}

/// Everything needed to build a fresh node, with no children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Leaf {
    String(String),
    /// Sorted names of the fields the map was created with.
    Map(Vec<String>),
    /// Keys of the elements the list was created with.
    List(Vec<Key>),
    /// A literal plus an id that keeps equal deltas from different
    /// replicas (or different moments) apart.
    Number { literal: i64, unique: Unique },
    Single,
    Trinary(Option<bool>),
}

impl Leaf {
    pub fn node_type(&self) -> NodeType {
        return match self {
            Leaf::String(_) => NodeType::String,
            Leaf::Map(_) => NodeType::Map,
            Leaf::List(_) => NodeType::List,
            Leaf::Number { .. } => NodeType::Number,
            Leaf::Single => NodeType::Single,
            Leaf::Trinary(_) => NodeType::Trinary,
        };
    }

    /// The bytes the key is derived from: type tag followed by the value.
    pub fn content(&self) -> Vec<u8> {
        let mut content = vec![self.node_type().tag()];
        match self {
            Leaf::String(text) => content.extend_from_slice(text.as_bytes()),
            Leaf::Map(fields) => {
                content.extend(Value::from(fields.clone()).to_string().into_bytes());
            }
            Leaf::List(elements) => {
                let keys: Vec<Value> = elements.iter().map(|k| Value::from(k.as_str())).collect();
                content.extend(Value::Array(keys).to_string().into_bytes());
            }
            Leaf::Number { literal, unique } => {
                content.extend(format!("{}:{}", literal, unique).into_bytes());
            }
            Leaf::Single => {}
            Leaf::Trinary(value) => {
                let text = match value {
                    Some(true) => "true",
                    Some(false) => "false",
                    None => "null",
                };
                content.extend_from_slice(text.as_bytes());
            }
        }
        return content;
    }

    pub fn key(&self, hasher: &dyn ContentKey) -> Key {
        if let Leaf::Single = self {
            return Key::single();
        }
        return hasher.key(&self.content());
    }

    /// Pick the node variant for a plain value by its shape.
    ///
    /// Containers only describe their own shape here; their contents are
    /// inserted as separate children.
    pub fn from_value(value: &Value, hasher: &dyn ContentKey) -> Result<Leaf> {
        return match value {
            Value::String(text) => Ok(Leaf::String(text.clone())),
            Value::Bool(flag) => Ok(Leaf::Trinary(Some(*flag))),
            Value::Null => Ok(Leaf::Trinary(None)),
            Value::Number(number) => match number.as_i64() {
                Some(literal) => Ok(Leaf::Number {
                    literal,
                    unique: Unique::none(),
                }),
                None => Err(Error::UnsupportedValue(format!(
                    "only 64-bit integers are supported, got {}",
                    number
                ))),
            },
            Value::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    elements.push(Leaf::from_value(item, hasher)?.key(hasher));
                }
                Ok(Leaf::List(elements))
            }
            Value::Object(fields) => {
                let mut names: Vec<String> = fields.keys().cloned().collect();
                names.sort();
                Ok(Leaf::Map(names))
            }
        };
    }

    /// Wire arguments that follow the position in an insert instruction.
    pub fn args(&self) -> Vec<Value> {
        return match self {
            Leaf::String(text) => vec![Value::from(text.as_str())],
            Leaf::Map(fields) => vec![Value::from(fields.clone())],
            Leaf::List(elements) => {
                let keys: Vec<Value> = elements.iter().map(|k| Value::from(k.as_str())).collect();
                vec![Value::Array(keys)]
            }
            Leaf::Number { literal, unique } => {
                vec![Value::from(*literal), unique.to_value()]
            }
            Leaf::Single => Vec::new(),
            Leaf::Trinary(value) => vec![match value {
                Some(flag) => Value::Bool(*flag),
                None => Value::Null,
            }],
        };
    }

    /// Inverse of [`Leaf::args`].
    pub fn from_args(node_type: NodeType, args: &[Value]) -> Result<Leaf> {
        let malformed = |what: &str| {
            return Error::MalformedInstruction(format!("{} insert expects {}", node_type, what));
        };
        let leaf = match (node_type, args) {
            (NodeType::String, [Value::String(text)]) => Leaf::String(text.clone()),
            (NodeType::String, _) => return Err(malformed("a string")),
            (NodeType::Map, [Value::Array(names)]) => {
                let mut fields = Vec::with_capacity(names.len());
                for name in names {
                    match name {
                        Value::String(name) => fields.push(name.clone()),
                        _ => return Err(malformed("a list of field names")),
                    }
                }
                fields.sort();
                Leaf::Map(fields)
            }
            (NodeType::Map, _) => return Err(malformed("a list of field names")),
            (NodeType::List, [Value::Array(keys)]) => {
                let mut elements = Vec::with_capacity(keys.len());
                for key in keys {
                    match key {
                        Value::String(key) => elements.push(Key::new(key.clone())?),
                        _ => return Err(malformed("a list of element keys")),
                    }
                }
                Leaf::List(elements)
            }
            (NodeType::List, _) => return Err(malformed("a list of element keys")),
            (NodeType::Number, [literal, unique]) => {
                let Some(literal) = literal.as_i64() else {
                    return Err(malformed("an integer literal"));
                };
                let Some(unique) = Unique::from_value(unique) else {
                    return Err(malformed("a string or integer unique id"));
                };
                Leaf::Number { literal, unique }
            }
            (NodeType::Number, _) => return Err(malformed("a literal and a unique id")),
            (NodeType::Single, []) => Leaf::Single,
            (NodeType::Single, _) => return Err(malformed("no value")),
            (NodeType::Trinary, [Value::Bool(flag)]) => Leaf::Trinary(Some(*flag)),
            (NodeType::Trinary, [Value::Null]) => Leaf::Trinary(None),
            (NodeType::Trinary, _) => return Err(malformed("true, false or null")),
        };
        return Ok(leaf);
    }
}

/// The id half of a number leaf.
///
/// Replicas may send it as a JSON string or a JSON integer. Both are kept as
/// they arrived so the leaf goes back on the wire unchanged; for keying, an
/// integer and the string of its digits name the same delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unique {
    Text(String),
    Integer(i64),
}

impl Unique {
    /// The id of a number built from a plain value.
    pub fn none() -> Unique {
        return Unique::Text(String::new());
    }

    pub fn from_value(value: &Value) -> Option<Unique> {
        return match value {
            Value::String(text) => Some(Unique::Text(text.clone())),
            Value::Number(number) => number.as_i64().map(Unique::Integer),
            _ => None,
        };
    }

    pub fn to_value(&self) -> Value {
        return match self {
            Unique::Text(text) => Value::from(text.as_str()),
            Unique::Integer(n) => Value::from(*n),
        };
    }
}

impl fmt::Display for Unique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Unique::Text(text) => f.write_str(text),
            Unique::Integer(n) => write!(f, "{}", n),
        };
    }
}

impl From<String> for Unique {
    fn from(text: String) -> Unique {
        return Unique::Text(text);
    }
}

impl From<&str> for Unique {
    fn from(text: &str) -> Unique {
        return Unique::Text(text.to_string());
    }
}

/// Per-position deletion flags. A flag, once set, stays set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tombstones(Vec<bool>);

impl Tombstones {
    pub fn new(len: usize) -> Tombstones {
        return Tombstones(vec![false; len]);
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    pub fn is_deleted(&self, position: usize) -> bool {
        return self.0.get(position).copied().unwrap_or(false);
    }

    /// Mark a position deleted. Returns false if it already was.
    pub(crate) fn bury(&mut self, position: usize) -> bool {
        let was = self.0[position];
        self.0[position] = true;
        return !was;
    }

    /// Only used to undo a rolled back operation.
    pub(crate) fn unbury(&mut self, position: usize) {
        self.0[position] = false;
    }

    /// Deleted positions, ascending.
    pub fn deleted(&self) -> impl Iterator<Item = usize> + '_ {
        return self.0.iter().enumerate().filter(|(_, dead)| **dead).map(|(i, _)| i);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringNode {
    pub(crate) text: Vec<char>,
    pub(crate) slots: Vec<ChildSet>,
    pub(crate) deleted: Tombstones,
}

impl StringNode {
    pub fn new(text: &str) -> StringNode {
        let text: Vec<char> = text.chars().collect();
        return StringNode {
            slots: (0..=text.len()).map(|_| ChildSet::only(NodeType::String)).collect(),
            deleted: Tombstones::new(text.len()),
            text,
        };
    }

    pub fn text(&self) -> String {
        return self.text.iter().collect();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListNode {
    pub(crate) elements: Vec<Key>,
    pub(crate) slots: Vec<ChildSet>,
    pub(crate) deleted: Tombstones,
}

impl ListNode {
    pub fn new(elements: Vec<Key>) -> ListNode {
        let slots = (0..=elements.len() * 2)
            .map(|slot| {
                if slot % 2 == 0 {
                    ChildSet::only(NodeType::List)
                } else {
                    ChildSet::any()
                }
            })
            .collect();
        return ListNode {
            deleted: Tombstones::new(elements.len()),
            elements,
            slots,
        };
    }

    pub fn elements(&self) -> &[Key] {
        return &self.elements;
    }

    /// The slot holding element `index`'s value.
    pub fn element_slot(index: usize) -> usize {
        return index * 2 + 1;
    }

    /// The slot for insertions before element `index`.
    pub fn insertion_slot(index: usize) -> usize {
        return index * 2;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapNode {
    pub(crate) fields: Vec<String>,
    pub(crate) slots: BTreeMap<String, ChildSet>,
}

impl MapNode {
    pub fn new(fields: Vec<String>) -> MapNode {
        return MapNode {
            fields,
            slots: BTreeMap::new(),
        };
    }

    fn field_set() -> ChildSet {
        return ChildSet::limited(Key::single(), NodeType::Single);
    }

    /// Field names that currently hold a value, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        return self
            .slots
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(name, _)| name.as_str());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberNode {
    pub(crate) literal: i64,
    pub(crate) unique: Unique,
    pub(crate) deltas: ChildSet,
}

impl NumberNode {
    pub fn new(literal: i64, unique: Unique) -> NumberNode {
        return NumberNode {
            literal,
            unique,
            deltas: ChildSet::only(NodeType::Number),
        };
    }

    pub fn literal(&self) -> i64 {
        return self.literal;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleNode {
    pub(crate) values: ChildSet,
    pub(crate) next: ChildSet,
}

impl SingleNode {
    pub const VALUE_SLOT: usize = 0;
    pub const NEXT_SLOT: usize = 1;

    pub fn new() -> SingleNode {
        return SingleNode {
            values: ChildSet::any(),
            next: ChildSet::limited(Key::single(), NodeType::Single),
        };
    }
}

impl Default for SingleNode {
    fn default() -> Self {
        return Self::new();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrinaryNode(pub Option<bool>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    String(StringNode),
    List(ListNode),
    Map(MapNode),
    Number(NumberNode),
    Single(SingleNode),
    Trinary(TrinaryNode),
}

/// A node in the arena: its content key, its parent and its variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub(crate) key: Key,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    /// Flattened length of a string or list, inserted children included.
    /// Kept up to date by the tree; 1 for every other variant.
    pub(crate) visible: usize,
    /// Whether `visible` counts towards the parent's, i.e. this node sits in
    /// an insertion slot of a sequence.
    pub(crate) inline: bool,
}

impl Node {
    pub fn from_leaf(leaf: &Leaf, key: Key, parent: Option<NodeId>) -> Node {
        let kind = match leaf {
            Leaf::String(text) => NodeKind::String(StringNode::new(text)),
            Leaf::Map(fields) => NodeKind::Map(MapNode::new(fields.clone())),
            Leaf::List(elements) => NodeKind::List(ListNode::new(elements.clone())),
            Leaf::Number { literal, unique } => {
                NodeKind::Number(NumberNode::new(*literal, unique.clone()))
            }
            Leaf::Single => NodeKind::Single(SingleNode::new()),
            Leaf::Trinary(value) => NodeKind::Trinary(TrinaryNode(*value)),
        };
        let visible = match &kind {
            NodeKind::String(node) => node.text.len(),
            NodeKind::List(node) => node.elements.len(),
            _ => 1,
        };
        return Node {
            key,
            parent,
            kind,
            visible,
            inline: false,
        };
    }

    pub fn key(&self) -> &Key {
        return &self.key;
    }

    pub fn parent(&self) -> Option<NodeId> {
        return self.parent;
    }

    pub fn kind(&self) -> &NodeKind {
        return &self.kind;
    }

    /// Whether a child put at `slot` is part of this node's flattened
    /// sequence rather than a value held by it.
    pub fn inlines(&self, slot: &Slot) -> bool {
        return match (&self.kind, slot) {
            (NodeKind::String(_), Slot::Index(_)) => true,
            (NodeKind::List(_), Slot::Index(i)) => i % 2 == 0,
            _ => false,
        };
    }

    pub fn node_type(&self) -> NodeType {
        return match &self.kind {
            NodeKind::String(_) => NodeType::String,
            NodeKind::List(_) => NodeType::List,
            NodeKind::Map(_) => NodeType::Map,
            NodeKind::Number(_) => NodeType::Number,
            NodeKind::Single(_) => NodeType::Single,
            NodeKind::Trinary(_) => NodeType::Trinary,
        };
    }

    /// The leaf this node was built from.
    pub fn leaf(&self) -> Leaf {
        return match &self.kind {
            NodeKind::String(node) => Leaf::String(node.text()),
            NodeKind::List(node) => Leaf::List(node.elements.clone()),
            NodeKind::Map(node) => Leaf::Map(node.fields.clone()),
            NodeKind::Number(node) => Leaf::Number {
                literal: node.literal,
                unique: node.unique.clone(),
            },
            NodeKind::Single(_) => Leaf::Single,
            NodeKind::Trinary(node) => Leaf::Trinary(node.0),
        };
    }

    pub fn tombstones(&self) -> Option<&Tombstones> {
        return match &self.kind {
            NodeKind::String(node) => Some(&node.deleted),
            NodeKind::List(node) => Some(&node.deleted),
            _ => None,
        };
    }

    pub(crate) fn tombstones_mut(&mut self) -> Option<&mut Tombstones> {
        return match &mut self.kind {
            NodeKind::String(node) => Some(&mut node.deleted),
            NodeKind::List(node) => Some(&mut node.deleted),
            _ => None,
        };
    }

    /// The children at a slot, if the slot exists and has been opened.
    pub fn slot(&self, slot: &Slot) -> Option<&ChildSet> {
        return match (&self.kind, slot) {
            (NodeKind::String(node), Slot::Index(i)) => node.slots.get(*i),
            (NodeKind::List(node), Slot::Index(i)) => node.slots.get(*i),
            (NodeKind::Map(node), Slot::Field(name)) => node.slots.get(name),
            (NodeKind::Number(node), Slot::Index(0)) => Some(&node.deltas),
            (NodeKind::Single(node), Slot::Index(0)) => Some(&node.values),
            (NodeKind::Single(node), Slot::Index(1)) => Some(&node.next),
            _ => None,
        };
    }

    /// Mutable access to a slot, opening map fields on first use.
    pub(crate) fn slot_mut(&mut self, slot: &Slot) -> Option<&mut ChildSet> {
        return match (&mut self.kind, slot) {
            (NodeKind::String(node), Slot::Index(i)) => node.slots.get_mut(*i),
            (NodeKind::List(node), Slot::Index(i)) => node.slots.get_mut(*i),
            (NodeKind::Map(node), Slot::Field(name)) => {
                Some(node.slots.entry(name.clone()).or_insert_with(MapNode::field_set))
            }
            (NodeKind::Number(node), Slot::Index(0)) => Some(&mut node.deltas),
            (NodeKind::Single(node), Slot::Index(0)) => Some(&mut node.values),
            (NodeKind::Single(node), Slot::Index(1)) => Some(&mut node.next),
            _ => None,
        };
    }

    /// Every opened slot, in slot order.
    pub fn slots(&self) -> Vec<(Slot, &ChildSet)> {
        return match &self.kind {
            NodeKind::String(node) => indexed(&node.slots),
            NodeKind::List(node) => indexed(&node.slots),
            NodeKind::Map(node) => node
                .slots
                .iter()
                .map(|(name, set)| (Slot::Field(name.clone()), set))
                .collect(),
            NodeKind::Number(node) => vec![(Slot::Index(0), &node.deltas)],
            NodeKind::Single(node) => {
                vec![(Slot::Index(0), &node.values), (Slot::Index(1), &node.next)]
            }
            NodeKind::Trinary(_) => Vec::new(),
        };
    }

    /// Check that a child of `node_type` keyed `key` may be put at `slot`.
    pub fn check_put(&self, slot: &Slot, key: &Key, node_type: NodeType) -> Result<()> {
        let owner = self.node_type();
        let unputable = |reason: &str| -> Error {
            return UnsupportedInstructionError::Unputable {
                node: owner,
                reason: reason.to_string(),
            }
            .into();
        };
        let slot_count = match (&self.kind, slot) {
            (NodeKind::Trinary(_), _) => return Err(unputable("trinary nodes have no children")),
            (NodeKind::Map(_), Slot::Field(_)) => {
                return MapNode::field_set().admit(owner, key, node_type);
            }
            (NodeKind::Map(_), Slot::Index(_)) => {
                return Err(unputable("map positions are field names"));
            }
            (_, Slot::Field(_)) => return Err(unputable("only maps have named fields")),
            (NodeKind::String(node), _) => node.slots.len(),
            (NodeKind::List(node), _) => node.slots.len(),
            (NodeKind::Number(_), _) => 1,
            (NodeKind::Single(_), _) => 2,
        };
        let position = slot.index().unwrap_or(usize::MAX);
        if position >= slot_count {
            return Err(Error::IndexOutOfRange {
                position,
                length: slot_count - 1,
            });
        }
        return match self.slot(slot) {
            Some(set) => set.admit(owner, key, node_type),
            None => Err(unputable("no such slot")),
        };
    }

    /// Check that the inclusive range `start..=end` may be tombstoned.
    pub fn check_delete(&self, start: usize, end: usize) -> Result<()> {
        let Some(tombstones) = self.tombstones() else {
            return Err(UnsupportedInstructionError::Undelable {
                node: self.node_type(),
            }
            .into());
        };
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        if end >= tombstones.len() {
            return Err(Error::IndexOutOfRange {
                position: end,
                length: tombstones.len(),
            });
        }
        return Ok(());
    }
}

fn indexed(slots: &[ChildSet]) -> Vec<(Slot, &ChildSet)> {
    return slots
        .iter()
        .enumerate()
        .map(|(i, set)| (Slot::Index(i), set))
        .collect();
}
