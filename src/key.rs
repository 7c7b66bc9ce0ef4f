//! Content keys and replica identities.
//!
//! Every node in a tree is named by a short key derived from its content.
//! Keys are the only thing that orders competing children in a slot, so two
//! replicas that hash the same content must arrive at the same key, and two
//! different contents must (for all practical purposes) never share one.
//!
//! The hashing itself is pluggable through [`ContentKey`]. The default,
//! [`Blake3Key`], keeps 96 bits of a blake3 digest and encodes them as 16
//! URL-safe base64 characters.

use std::cmp::Ordering;
use std::fmt;

use base64ct::Base64UrlUnpadded;
use base64ct::Encoding;
use rand_core::OsRng;
use rand_core::RngCore;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::Error;
use crate::error::Result;

/// The longest key a [`ContentKey`] oracle may produce.
pub const MAX_KEY_LEN: usize = 16;

/// The reserved key shared by every single node. Sorts after every other key.
pub const SINGLE_KEY: &str = "/single";

/// A content-derived node identifier, 1 to 16 characters long.
///
/// Ordering is lexicographic, except that [`SINGLE_KEY`] is always last.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    /// Validate and wrap a key.
    pub fn new(key: impl Into<String>) -> Result<Key> {
        let key = key.into();
        let len = key.chars().count();
        if len == 0 || len > MAX_KEY_LEN {
            return Err(Error::MalformedAddress(format!(
                "key {:?} must be 1 to {} characters",
                key, MAX_KEY_LEN
            )));
        }
        return Ok(Key(key));
    }

    /// The key shared by all single nodes.
    pub fn single() -> Key {
        return Key(SINGLE_KEY.to_string());
    }

    /// Whether this is the reserved single key.
    pub fn is_single(&self) -> bool {
        return self.0 == SINGLE_KEY;
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        return match (self.is_single(), other.is_single()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.0.cmp(&other.0),
        };
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Key({})", self.0);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return serializer.serialize_str(&self.0);
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Key, D::Error> {
        let raw = String::deserialize(deserializer)?;
        return Key::new(raw).map_err(serde::de::Error::custom);
    }
}

/// Maps content bytes to a short key.
///
/// Implementations must be deterministic and agree across every replica of a
/// document. Conflict resolution assumes that distinct contents never share a
/// key, so the oracle should keep as many digest bits as the 16 character
/// limit allows, and must never return [`SINGLE_KEY`].
pub trait ContentKey: Send + Sync {
    fn key(&self, content: &[u8]) -> Key;
}

/// The default oracle: 96 bits of blake3, base64url encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Key;

impl ContentKey for Blake3Key {
    fn key(&self, content: &[u8]) -> Key {
        let digest = blake3::hash(content);
        let encoded = Base64UrlUnpadded::encode_string(&digest.as_bytes()[..12]);
        return Key(encoded);
    }
}

/// A globally unique replica identifier, 128 bits.
///
/// Replicas are always named explicitly; the only way to get a fresh id is to
/// ask for one with [`ReplicaId::generate`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaId(pub [u8; 16]);

impl ReplicaId {
    /// Generate a random replica id from the operating system RNG.
    pub fn generate() -> ReplicaId {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        return ReplicaId(bytes);
    }

    pub fn from_u128(id: u128) -> ReplicaId {
        return ReplicaId(id.to_be_bytes());
    }
}

fn hex(bytes: &[u8]) -> String {
    return bytes.iter().map(|b| format!("{:02x}", b)).collect();
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&hex(&self.0));
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "ReplicaId({})", hex(&self.0));
    }
}
