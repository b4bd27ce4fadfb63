//! Core types for the three-tier chain hierarchy

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{HierarchyError, Result};

/// 32-byte block header hash
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the "empty slot" marker
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl FromStr for Hash {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 64 {
            return Err(HierarchyError::InvalidHash(format!(
                "expected 64 hex digits, got {}",
                digits.len()
            )));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| HierarchyError::InvalidHash(e.to_string()))?;
        Ok(Hash(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hierarchy tier. `Zone` is the leaf tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Top,
    Region,
    Zone,
}

impl Level {
    /// Position of this tier in per-level header arrays
    pub fn index(self) -> usize {
        match self {
            Level::Top => 0,
            Level::Region => 1,
            Level::Zone => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Top => "top",
            Level::Region => "region",
            Level::Zone => "zone",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a block in the hierarchy: (region index, zone index)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub region: usize,
    pub zone: usize,
}

impl Coordinate {
    pub fn new(region: usize, zone: usize) -> Self {
        Self { region, zone }
    }

    /// Sibling-branch index of this coordinate when viewed from `level`.
    ///
    /// A top-tier walk disambiguates regions, a region-tier walk disambiguates
    /// zones. Zones have no descendants, so there is nothing to index.
    pub fn branch_at(&self, level: Level) -> Option<usize> {
        match level {
            Level::Top => Some(self.region),
            Level::Region => Some(self.zone),
            Level::Zone => None,
        }
    }
}

/// Minimal header view consumed from a chain client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub hash: Hash,
    /// One parent reference per tier, ordered Top, Region, Zone
    pub parent_hashes: [Hash; 3],
    /// One height per tier, ordered Top, Region, Zone
    pub numbers: [u64; 3],
    pub location: Coordinate,
}

impl Header {
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parent_hash(&self, level: Level) -> Hash {
        self.parent_hashes[level.index()]
    }

    pub fn number(&self, level: Level) -> u64 {
        self.numbers[level.index()]
    }

    pub fn location(&self) -> Coordinate {
        self.location
    }
}

/// Per-branch "last point of agreement" hashes.
///
/// Slots `0..R` hold the nearest ancestor on each sibling branch, slot `R`
/// holds the reference hash the walk started from. Serializes as a plain list.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Hash>", into = "Vec<Hash>")]
pub struct TerminusVector {
    slots: Vec<Hash>,
}

impl TerminusVector {
    /// Empty vector for branching factor `branching`, with the terminus slot set
    pub fn new(branching: usize, reference: Hash) -> Self {
        let mut slots = vec![Hash::ZERO; branching + 1];
        slots[branching] = reference;
        Self { slots }
    }

    pub fn branching(&self) -> usize {
        self.slots.len() - 1
    }

    /// The reference hash the walk started from
    pub fn terminus(&self) -> Hash {
        self.slots[self.branching()]
    }

    pub fn branch(&self, index: usize) -> Option<Hash> {
        if index < self.branching() {
            Some(self.slots[index])
        } else {
            None
        }
    }

    /// Fill `index` unless something was already recorded there. First hash wins.
    pub fn fill_if_empty(&mut self, index: usize, hash: Hash) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_zero() => {
                *slot = hash;
                true
            }
            _ => false,
        }
    }

    pub fn fill_remaining(&mut self, hash: Hash) {
        for slot in self.slots.iter_mut().filter(|s| s.is_zero()) {
            *slot = hash;
        }
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_zero()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled() == self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn as_slice(&self) -> &[Hash] {
        &self.slots
    }
}

impl TryFrom<Vec<Hash>> for TerminusVector {
    type Error = HierarchyError;

    /// At least one branch slot plus the terminus
    fn try_from(slots: Vec<Hash>) -> Result<Self> {
        if slots.len() < 2 {
            return Err(HierarchyError::Shape(format!(
                "terminus vector needs at least 2 slots, got {}",
                slots.len()
            )));
        }
        Ok(Self { slots })
    }
}

impl From<TerminusVector> for Vec<Hash> {
    fn from(t: TerminusVector) -> Self {
        t.slots
    }
}

impl fmt::Debug for TerminusVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.iter()).finish()
    }
}
