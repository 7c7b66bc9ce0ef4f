//! Paths from a node to one of its descendants.
//!
//! An address is a sequence of hops. A hop either names a slot position and
//! the key of a child in that slot, or jumps into a map field by name, where
//! the field's only child is implied. On the wire the hops flatten into a
//! JSON array of integers and strings: `[2, "ab3", "title", 0, "x9"]` is
//! "slot 2, child `ab3`; field `title`; slot 0, child `x9`".

use std::fmt;
use std::ops::Add;
use std::ops::AddAssign;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;
use smallvec::SmallVec;

use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;
use crate::key::Key;

/// A position inside a node: a numbered slot, or a named map field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Index(usize),
    Field(String),
}

impl Slot {
    pub fn proto(&self) -> Value {
        return match self {
            Slot::Index(index) => Value::from(*index),
            Slot::Field(field) => Value::from(field.clone()),
        };
    }

    pub fn from_proto(value: &Value) -> Result<Slot> {
        if let Some(index) = value.as_u64() {
            return Ok(Slot::Index(index as usize));
        }
        if let Some(field) = value.as_str() {
            return Ok(Slot::Field(field.to_string()));
        }
        return Err(Error::MalformedInstruction(format!(
            "position must be a non-negative integer or a field name, got {}",
            value
        )));
    }

    pub fn index(&self) -> Option<usize> {
        return match self {
            Slot::Index(index) => Some(*index),
            Slot::Field(_) => None,
        };
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Slot::Index(index) => write!(f, "{}", index),
            Slot::Field(field) => write!(f, "{:?}", field),
        };
    }
}

/// One step of an [`Address`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Hop {
    /// Descend into slot `position` and pick the child keyed `key`.
    Child { position: usize, key: Key },
    /// Enter a map field; the field holds exactly one child.
    Jump(String),
}

impl Hop {
    /// The hop that reaches the child keyed `key` at `slot`.
    pub fn to(slot: &Slot, key: &Key) -> Hop {
        return match slot {
            Slot::Index(position) => Hop::Child {
                position: *position,
                key: key.clone(),
            },
            Slot::Field(field) => Hop::Jump(field.clone()),
        };
    }

    pub fn slot(&self) -> Slot {
        return match self {
            Hop::Child { position, .. } => Slot::Index(*position),
            Hop::Jump(field) => Slot::Field(field.clone()),
        };
    }
}

/// An ordered path of hops, relative to whichever node it is resolved from.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    hops: SmallVec<[Hop; 4]>,
}

impl Address {
    /// The empty address, naming the node it is resolved from.
    pub fn root() -> Address {
        return Address {
            hops: SmallVec::new(),
        };
    }

    pub fn from_hops(hops: impl IntoIterator<Item = Hop>) -> Address {
        return Address {
            hops: hops.into_iter().collect(),
        };
    }

    /// Parse the flattened wire form.
    ///
    /// Every integer must be followed by a key. A string that does not follow
    /// an integer is a field jump.
    pub fn parse(elements: &[Value]) -> Result<Address> {
        let mut hops = SmallVec::new();
        let mut pending: Option<usize> = None;
        for element in elements {
            match element {
                Value::Number(number) => {
                    if pending.is_some() {
                        return Err(Error::MalformedAddress(
                            "two consecutive positions".to_string(),
                        ));
                    }
                    let position = number.as_u64().ok_or_else(|| {
                        Error::MalformedAddress(format!("bad position {}", number))
                    })?;
                    pending = Some(position as usize);
                }
                Value::String(text) => match pending.take() {
                    Some(position) => hops.push(Hop::Child {
                        position,
                        key: Key::new(text.clone())?,
                    }),
                    None => hops.push(Hop::Jump(text.clone())),
                },
                other => {
                    return Err(Error::MalformedAddress(format!(
                        "unexpected element {}",
                        other
                    )));
                }
            }
        }
        if pending.is_some() {
            return Err(Error::MalformedAddress(
                "address ends on a bare position".to_string(),
            ));
        }
        return Ok(Address { hops });
    }

    pub fn from_proto(value: &Value) -> Result<Address> {
        return match value {
            Value::Array(elements) => Address::parse(elements),
            other => Err(Error::MalformedAddress(format!("not an array: {}", other))),
        };
    }

    pub fn proto(&self) -> Value {
        let mut elements = Vec::with_capacity(self.hops.len() * 2);
        for hop in &self.hops {
            match hop {
                Hop::Child { position, key } => {
                    elements.push(Value::from(*position));
                    elements.push(Value::from(key.as_str()));
                }
                Hop::Jump(field) => elements.push(Value::from(field.as_str())),
            }
        }
        return Value::Array(elements);
    }

    pub fn hops(&self) -> &[Hop] {
        return &self.hops;
    }

    pub fn len(&self) -> usize {
        return self.hops.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.hops.is_empty();
    }

    pub fn last(&self) -> Option<&Hop> {
        return self.hops.last();
    }

    pub fn append(&mut self, hop: Hop) {
        self.hops.push(hop);
    }

    pub fn prepend(&mut self, hop: Hop) {
        self.hops.insert(0, hop);
    }

    /// A copy of this address with `hop` appended.
    pub fn child(&self, hop: Hop) -> Address {
        let mut address = self.clone();
        address.append(hop);
        return address;
    }

    /// This address without its last hop.
    pub fn parent(&self) -> Result<Address> {
        if self.hops.is_empty() {
            return Err(Error::MalformedAddress(
                "the empty address has no parent".to_string(),
            ));
        }
        let mut parent = self.clone();
        parent.hops.pop();
        return Ok(parent);
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        let len = self.hops.len();
        return other.hops.len() >= len && other.hops[..len] == self.hops[..];
    }

    /// Walk the hops from `from`, returning the node reached.
    pub fn resolve(&self, tree: &Tree, from: NodeId) -> Result<NodeId> {
        let mut node = from;
        for hop in &self.hops {
            node = match tree.get(node, hop)? {
                Some(child) => child,
                None => {
                    return Err(Error::Unresolvable {
                        address: self.clone(),
                    });
                }
            };
        }
        return Ok(node);
    }

    /// The slot the final hop occupies in its container.
    ///
    /// The container is resolved so that a field jump is only accepted where
    /// a map actually lives.
    pub fn position(&self, tree: &Tree, from: NodeId) -> Result<Slot> {
        let hop = self.last().ok_or_else(|| {
            Error::MalformedAddress("the empty address has no position".to_string())
        })?;
        let container = self.parent()?.resolve(tree, from)?;
        if let Hop::Jump(_) = hop {
            tree.expect_map(container)?;
        }
        return Ok(hop.slot());
    }
}

impl Add for Address {
    type Output = Address;

    fn add(mut self, rhs: Address) -> Address {
        self += rhs;
        return self;
    }
}

impl AddAssign for Address {
    fn add_assign(&mut self, rhs: Address) {
        self.hops.extend(rhs.hops);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", self.proto());
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Address({})", self.proto());
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return self.proto().serialize(serializer);
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Address, D::Error> {
        let value = Value::deserialize(deserializer)?;
        return Address::from_proto(&value).map_err(serde::de::Error::custom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::node::Leaf;
    use crate::crdt::node::NodeType;
    use serde_json::json;

    #[test]
    fn parse_mixed_hops() {
        let address = Address::from_proto(&json!([2, "ab3", "title", 0, "x9"])).unwrap();
        assert_eq!(address.len(), 3);
        assert_eq!(address.hops()[1], Hop::Jump("title".to_string()));
        assert_eq!(address.proto(), json!([2, "ab3", "title", 0, "x9"]));
    }

    #[test]
    fn parse_rejects_consecutive_positions() {
        let err = Address::from_proto(&json!([1, 2, "k"])).unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));
    }

    #[test]
    fn parse_rejects_trailing_position() {
        let err = Address::from_proto(&json!([1, "k", 3])).unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));
    }

    #[test]
    fn parse_rejects_other_elements() {
        assert!(Address::from_proto(&json!([true])).is_err());
        assert!(Address::from_proto(&json!([-1, "k"])).is_err());
        assert!(Address::from_proto(&json!({"a": 1})).is_err());
    }

    #[test]
    fn parent_of_empty_is_an_error() {
        assert!(Address::root().parent().is_err());
        let address = Address::from_proto(&json!([0, "a", 1, "b"])).unwrap();
        assert_eq!(address.parent().unwrap().proto(), json!([0, "a"]));
    }

    #[test]
    fn concatenation_and_prepend() {
        let mut address = Address::from_proto(&json!([0, "a"])).unwrap();
        address += Address::from_proto(&json!(["f"])).unwrap();
        address.prepend(Hop::Jump("doc".to_string()));
        assert_eq!(address.proto(), json!(["doc", 0, "a", "f"]));

        let prefix = Address::from_proto(&json!(["doc"])).unwrap();
        assert!(prefix.is_prefix_of(&address));
        assert!(!address.is_prefix_of(&prefix));
    }

    #[test]
    fn position_of_a_child_hop() {
        let mut tree = Tree::new(&json!("grey")).unwrap();
        let root = tree.root();
        let leaf = Leaf::String(" cat.".to_string());
        let key = leaf.key(tree.hasher());
        tree.put(root, &Slot::Index(4), &leaf).unwrap();

        let address = Address::from_hops([Hop::Child { position: 4, key }]);
        assert_eq!(address.position(&tree, root).unwrap(), Slot::Index(4));
    }

    #[test]
    fn position_of_a_field_jump() {
        let tree = Tree::new(&json!({"a": 1})).unwrap();
        let address = Address::from_proto(&json!(["a"])).unwrap();
        assert_eq!(
            address.position(&tree, tree.root()).unwrap(),
            Slot::Field("a".to_string())
        );
    }

    #[test]
    fn field_jump_needs_a_map() {
        let tree = Tree::new(&json!("text")).unwrap();
        let address = Address::from_proto(&json!(["x"])).unwrap();
        assert!(matches!(
            address.position(&tree, tree.root()),
            Err(Error::WrongType { expected: NodeType::Map, found: NodeType::String })
        ));
    }

    #[test]
    fn empty_address_has_no_position() {
        let tree = Tree::new(&json!({"a": 1})).unwrap();
        assert!(matches!(
            Address::root().position(&tree, tree.root()),
            Err(Error::MalformedAddress(_))
        ));
    }

    #[test]
    fn child_leaves_original_untouched() {
        let address = Address::root();
        let child = address.child(Hop::Jump("x".to_string()));
        assert!(address.is_empty());
        assert_eq!(child.len(), 1);
    }
}
