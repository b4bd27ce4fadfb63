use async_trait::async_trait;

use crate::{Hash, Header, Result};

/// Read-only view of one chain endpoint
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn header_by_hash(&self, hash: Hash) -> Result<Header>;
    async fn header_by_number(&self, height: u64) -> Result<Header>;
    fn endpoint(&self) -> &str;
}

/// Opens client connections for the pool
#[async_trait]
pub trait Dialer: Send + Sync {
    type Client: ChainClient;

    async fn dial(&self, url: &str) -> Result<Self::Client>;
}
