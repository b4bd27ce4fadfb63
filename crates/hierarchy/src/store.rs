//! In-memory header store (for testing and dry runs)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{ChainClient, Hash, Header, HierarchyError, Level, Result};

/// One chain's headers, indexed by hash and by height on the chain's own tier
pub struct MemoryChain {
    name: String,
    level: Level,
    by_hash: HashMap<Hash, Header>,
    by_number: HashMap<u64, Hash>,
    lookups: AtomicUsize,
}

impl MemoryChain {
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            level,
            by_hash: HashMap::new(),
            by_number: HashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Add a header. Later inserts at the same height replace the canonical entry.
    pub fn insert(&mut self, header: Header) {
        self.by_number.insert(header.number(self.level), header.hash);
        self.by_hash.insert(header.hash, header);
    }

    /// Add a header reachable by hash only (not canonical at its height)
    pub fn insert_side(&mut self, header: Header) {
        self.by_hash.insert(header.hash, header);
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn header_by_hash(&self, hash: Hash) -> Result<Header> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.by_hash
            .get(&hash)
            .cloned()
            .ok_or(HierarchyError::HeaderNotFound { hash })
    }

    async fn header_by_number(&self, height: u64) -> Result<Header> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.by_number
            .get(&height)
            .and_then(|h| self.by_hash.get(h))
            .cloned()
            .ok_or(HierarchyError::HeightNotFound { height })
    }

    fn endpoint(&self) -> &str {
        &self.name
    }
}
