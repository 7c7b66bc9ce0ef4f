//! Operations: instruction lists applied all-or-nothing.
//!
//! An operation is what replicas exchange. Its instructions are addressed
//! relative to some base node (usually the document root) and applied in
//! order. If any of them fails once the tree has been touched, every
//! mutation made so far is undone from the tree's journal and the failure is
//! reported as [`Error::OpApply`].
//!
//! Operations also describe their own dependencies: the addresses they
//! create, and the addresses they need to already exist. A transport layer
//! can hold back an operation until [`Operation::ready`] says its
//! dependencies are met; this module only answers the question.

use std::ops::Add;
use std::ops::AddAssign;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;
use serde_json::json;

use crate::address::Address;
use crate::address::Hop;
use crate::address::Slot;
use crate::crdt::instruction::Instruction;
use crate::crdt::node::Leaf;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;
use crate::key::ContentKey;
use crate::key::Key;

/// A node an operation creates: the key inserted at `position` of `address`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Provision {
    pub address: Address,
    pub position: Slot,
    pub key: Key,
}

impl Provision {
    /// Where the created node lives.
    pub fn created(&self) -> Address {
        return self.address.child(Hop::to(&self.position, &self.key));
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Operation {
    instructions: Vec<Instruction>,
}

impl Operation {
    pub fn new(instructions: Vec<Instruction>) -> Operation {
        return Operation { instructions };
    }

    pub fn instructions(&self) -> &[Instruction] {
        return &self.instructions;
    }

    pub fn len(&self) -> usize {
        return self.instructions.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.instructions.is_empty();
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Re-address every instruction from a node `prefix` above its base.
    pub fn prefix(&mut self, prefix: &Address) {
        if prefix.is_empty() {
            return;
        }
        for instruction in &mut self.instructions {
            instruction.prefix(prefix);
        }
    }

    /// Apply every instruction below `at`, or none of them.
    pub fn apply(&self, tree: &mut Tree, at: NodeId) -> Result<()> {
        tracing::debug!(instructions = self.instructions.len(), "applying operation");
        tree.begin();
        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Err(error) = instruction.apply(tree, at, true) {
                tree.rollback();
                if index == 0 {
                    return Err(error);
                }
                tracing::warn!(index, %error, "rolled back operation");
                return Err(Error::OpApply(Box::new(error)));
            }
        }
        tree.commit();
        return Ok(());
    }

    /// Every node this operation creates.
    pub fn dep_provides(&self, hasher: &dyn ContentKey) -> Vec<Provision> {
        return self
            .instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Insert {
                    address,
                    position,
                    leaf,
                } => Some(Provision {
                    address: address.clone(),
                    position: position.clone(),
                    key: leaf.key(hasher),
                }),
                Instruction::Delete { .. } => None,
            })
            .collect();
    }

    /// Every address an instruction acts on that this operation does not
    /// create itself.
    pub fn dep_requires(&self, hasher: &dyn ContentKey) -> FxHashSet<Address> {
        let provided: FxHashSet<Address> = self
            .dep_provides(hasher)
            .iter()
            .map(Provision::created)
            .collect();
        return self
            .instructions
            .iter()
            .map(|instruction| instruction.address().clone())
            .filter(|address| !provided.contains(address))
            .collect();
    }

    /// Required addresses that do not resolve below `at`, in wire order.
    pub fn missing(&self, tree: &Tree, at: NodeId) -> Vec<Address> {
        let mut missing: Vec<Address> = self
            .dep_requires(tree.hasher())
            .into_iter()
            .filter(|address| address.resolve(tree, at).is_err())
            .collect();
        missing.sort_by_key(|address| address.to_string());
        return missing;
    }

    /// Whether every dependency already resolves below `at`.
    pub fn ready(&self, tree: &Tree, at: NodeId) -> bool {
        return self
            .dep_requires(tree.hasher())
            .iter()
            .all(|address| address.resolve(tree, at).is_ok());
    }

    /// Recreate the existing node `id` at `position` of the base node,
    /// children and tombstones included.
    pub fn from_node(tree: &Tree, id: NodeId, position: Slot) -> Operation {
        let node = tree.node(id);
        let hop = Hop::to(&position, node.key());
        let mut op = Operation::new(vec![Instruction::insert(
            Address::root(),
            position,
            node.leaf(),
        )]);
        op += Address::from_hops([hop]) + Operation::from_children(tree, id);
        return op;
    }

    /// Recreate the children and tombstones of `id`, relative to `id`.
    ///
    /// Every node is inserted before anything below it.
    pub fn from_children(tree: &Tree, id: NodeId) -> Operation {
        let mut op = Operation::default();
        let mut pending = vec![(Address::root(), id)];
        while let Some((address, id)) = pending.pop() {
            let node = tree.node(id);
            if let Some(tombstones) = node.tombstones() {
                let ranges = ranges_of(tombstones.deleted());
                if !ranges.is_empty() {
                    op.push(Instruction::delete(address.clone(), ranges));
                }
            }
            let mut children = Vec::new();
            for (slot, set) in node.slots() {
                for (key, child) in set.iter() {
                    let leaf = tree.node(child).leaf();
                    op.push(Instruction::insert(address.clone(), slot.clone(), leaf));
                    children.push((address.child(Hop::to(&slot, key)), child));
                }
            }
            pending.extend(children.into_iter().rev());
        }
        return op;
    }

    /// Insert a fresh subtree holding the plain `value` at `position` of the
    /// base node.
    pub fn from_structure(
        hasher: &dyn ContentKey,
        value: &Value,
        position: Slot,
    ) -> Result<Operation> {
        let leaf = Leaf::from_value(value, hasher)?;
        let hop = Hop::to(&position, &leaf.key(hasher));
        let mut op = Operation::new(vec![Instruction::insert(Address::root(), position, leaf)]);
        op += Address::from_hops([hop]) + Operation::structure_children(hasher, value)?;
        return Ok(op);
    }

    /// Fill a node already built from `value`'s leaf with `value`'s contents.
    pub fn structure_children(hasher: &dyn ContentKey, value: &Value) -> Result<Operation> {
        let mut op = Operation::default();
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    op += Operation::from_structure(hasher, item, Slot::Index(index * 2 + 1))?;
                }
            }
            Value::Object(fields) => {
                for (name, field) in fields {
                    op.push(Instruction::insert(
                        Address::root(),
                        Slot::Field(name.clone()),
                        Leaf::Single,
                    ));
                    let single = Address::from_hops([Hop::Jump(name.clone())]);
                    op += single + Operation::from_structure(hasher, field, Slot::Index(0))?;
                }
            }
            _ => {}
        }
        return Ok(op);
    }

    pub fn proto(&self) -> Value {
        let instructions: Vec<Value> = self.instructions.iter().map(Instruction::proto).collect();
        return json!({"type": "op", "instructions": instructions});
    }

    pub fn from_proto(value: &Value) -> Result<Operation> {
        if value.get("type").and_then(Value::as_str) != Some("op") {
            return Err(Error::MalformedInstruction("not an operation".to_string()));
        }
        let Some(raw) = value.get("instructions").and_then(Value::as_array) else {
            return Err(Error::MalformedInstruction(
                "operation has no instruction list".to_string(),
            ));
        };
        let mut instructions = Vec::with_capacity(raw.len());
        for instruction in raw {
            instructions.push(Instruction::from_proto(instruction)?);
        }
        return Ok(Operation { instructions });
    }
}

/// Collapse ascending positions into inclusive runs.
pub(crate) fn ranges_of(positions: impl IntoIterator<Item = usize>) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for position in positions {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == position => *end = position,
            _ => ranges.push((position, position)),
        }
    }
    return ranges;
}

impl Add for Operation {
    type Output = Operation;

    fn add(mut self, rhs: Operation) -> Operation {
        self += rhs;
        return self;
    }
}

impl AddAssign for Operation {
    fn add_assign(&mut self, rhs: Operation) {
        self.instructions.extend(rhs.instructions);
    }
}

/// `address + op` is `op` re-addressed to sit below `address`.
impl Add<Operation> for Address {
    type Output = Operation;

    fn add(self, mut op: Operation) -> Operation {
        op.prefix(&self);
        return op;
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return self.proto().serialize(serializer);
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Operation, D::Error> {
        let value = Value::deserialize(deserializer)?;
        return Operation::from_proto(&value).map_err(serde::de::Error::custom);
    }
}
