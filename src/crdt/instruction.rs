//! Single wire-level mutations.
//!
//! An instruction is `[code, address, ...args]`:
//!
//! | code | meaning | args |
//! |------|---------|------|
//! | 0 | delete | positions, or inclusive `[start, end]` ranges |
//! | 1 | insert string | `position, text` |
//! | 2 | insert map | `position, [field names]` |
//! | 3 | insert list | `position, [element keys]` |
//! | 4 | insert number | `position, literal, unique` |
//! | 5 | insert single | `position` |
//! | 6 | insert trinary | `position, true \| false \| null` |
//!
//! Both kinds are idempotent: inserting a key that is already present and
//! deleting a position that is already tombstoned change nothing.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;

use crate::address::Address;
use crate::address::Hop;
use crate::address::Slot;
use crate::crdt::node::Leaf;
use crate::crdt::node::NodeType;
use crate::crdt::tree::NodeId;
use crate::crdt::tree::Tree;
use crate::error::Error;
use crate::error::Result;
use crate::key::ContentKey;

/// Wire code of a delete instruction.
pub const DELETE: u64 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Tombstone every position in each inclusive range.
    Delete {
        address: Address,
        ranges: Vec<(usize, usize)>,
    },
    /// Adopt a fresh node built from `leaf` at `position`.
    Insert {
        address: Address,
        position: Slot,
        leaf: Leaf,
    },
}

impl Instruction {
    pub fn insert(address: Address, position: Slot, leaf: Leaf) -> Instruction {
        return Instruction::Insert {
            address,
            position,
            leaf,
        };
    }

    pub fn delete(address: Address, ranges: Vec<(usize, usize)>) -> Instruction {
        return Instruction::Delete { address, ranges };
    }

    pub fn code(&self) -> u64 {
        return match self {
            Instruction::Delete { .. } => DELETE,
            Instruction::Insert { leaf, .. } => leaf.node_type().code(),
        };
    }

    /// The node this instruction acts on.
    pub fn address(&self) -> &Address {
        return match self {
            Instruction::Delete { address, .. } => address,
            Instruction::Insert { address, .. } => address,
        };
    }

    /// Re-address this instruction from a node `prefix` above its current base.
    pub fn prefix(&mut self, prefix: &Address) {
        let address = match self {
            Instruction::Delete { address, .. } => address,
            Instruction::Insert { address, .. } => address,
        };
        *address = prefix.clone() + std::mem::take(address);
    }

    /// The address of the node an insert creates.
    pub fn created(&self, hasher: &dyn ContentKey) -> Option<Address> {
        return match self {
            Instruction::Insert {
                address,
                position,
                leaf,
            } => Some(address.child(Hop::to(position, &leaf.key(hasher)))),
            Instruction::Delete { .. } => None,
        };
    }

    pub fn proto(&self) -> Value {
        let mut elements = vec![Value::from(self.code()), self.address().proto()];
        match self {
            Instruction::Delete { ranges, .. } => {
                for (start, end) in ranges {
                    if start == end {
                        elements.push(Value::from(*start));
                    } else {
                        elements.push(Value::from(vec![*start, *end]));
                    }
                }
            }
            Instruction::Insert { position, leaf, .. } => {
                elements.push(position.proto());
                elements.extend(leaf.args());
            }
        }
        return Value::Array(elements);
    }

    pub fn from_proto(value: &Value) -> Result<Instruction> {
        let Some(elements) = value.as_array() else {
            return Err(Error::MalformedInstruction(format!("not an array: {}", value)));
        };
        let [code, address, args @ ..] = elements.as_slice() else {
            return Err(Error::MalformedInstruction(
                "needs at least a code and an address".to_string(),
            ));
        };
        let code = code
            .as_u64()
            .ok_or_else(|| Error::MalformedInstruction(format!("bad code {}", code)))?;
        let address = Address::from_proto(address)?;

        if code == DELETE {
            if args.is_empty() {
                return Err(Error::MalformedInstruction(
                    "delete needs at least one position".to_string(),
                ));
            }
            let mut ranges = Vec::with_capacity(args.len());
            for arg in args {
                ranges.push(parse_range(arg)?);
            }
            return Ok(Instruction::Delete { address, ranges });
        }

        let node_type = NodeType::from_code(code)
            .ok_or_else(|| Error::MalformedInstruction(format!("unknown code {}", code)))?;
        let Some((position, rest)) = args.split_first() else {
            return Err(Error::MalformedInstruction("insert needs a position".to_string()));
        };
        return Ok(Instruction::Insert {
            address,
            position: Slot::from_proto(position)?,
            leaf: Leaf::from_args(node_type, rest)?,
        });
    }

    /// Validate against `tree` without mutating it. Returns the target node.
    pub fn sanitycheck(&self, tree: &Tree, at: NodeId) -> Result<NodeId> {
        let target = self.address().resolve(tree, at)?;
        let node = tree.node(target);
        match self {
            Instruction::Delete { ranges, .. } => {
                if ranges.is_empty() {
                    return Err(Error::MalformedInstruction(
                        "delete needs at least one position".to_string(),
                    ));
                }
                for (start, end) in ranges {
                    node.check_delete(*start, *end)?;
                }
            }
            Instruction::Insert { position, leaf, .. } => {
                node.check_put(position, &leaf.key(tree.hasher()), leaf.node_type())?;
            }
        }
        return Ok(target);
    }

    /// Apply to the tree below `at`, optionally checking everything first so
    /// a bad instruction fails before any mutation.
    pub fn apply(&self, tree: &mut Tree, at: NodeId, checkfirst: bool) -> Result<()> {
        let target = if checkfirst {
            self.sanitycheck(tree, at)?
        } else {
            self.address().resolve(tree, at)?
        };
        tracing::trace!(code = self.code(), address = %self.address(), "applying instruction");
        match self {
            Instruction::Delete { ranges, .. } => {
                for (start, end) in ranges {
                    if start > end {
                        return Err(Error::InvalidRange {
                            start: *start,
                            end: *end,
                        });
                    }
                    for position in *start..=*end {
                        tree.bury(target, position)?;
                    }
                }
            }
            Instruction::Insert { position, leaf, .. } => {
                tree.put(target, position, leaf)?;
            }
        }
        return Ok(());
    }
}

fn parse_range(arg: &Value) -> Result<(usize, usize)> {
    if let Some(position) = arg.as_u64() {
        return Ok((position as usize, position as usize));
    }
    if let Some([start, end]) = arg.as_array().map(Vec::as_slice) {
        if let (Some(start), Some(end)) = (start.as_u64(), end.as_u64()) {
            return Ok((start as usize, end as usize));
        }
    }
    return Err(Error::MalformedInstruction(format!(
        "expected a position or a [start, end] range, got {}",
        arg
    )));
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return self.proto().serialize(serializer);
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Instruction, D::Error> {
        let value = Value::deserialize(deserializer)?;
        return Instruction::from_proto(&value).map_err(serde::de::Error::custom);
    }
}
