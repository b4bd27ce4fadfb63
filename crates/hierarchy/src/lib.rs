//! Hierarchy bad-hash propagation
//!
//! Given a top-tier block that has been declared invalid, walks every region
//! and zone chain of a three-tier hierarchy and finds the first block on each
//! chain that must be reconsidered once that block is excised.

mod types;
mod client;
mod guard;
mod rpc;
mod store;
mod pool;
mod termini;
mod walker;

pub use types::{Hash, Level, Coordinate, Header, TerminusVector};
pub use client::{ChainClient, Dialer};
pub use guard::CallGuard;
pub use rpc::{RpcClient, RpcDialer, encode_height};
pub use store::MemoryChain;
pub use pool::{Endpoints, RetryPolicy, Connectivity, Connector, ClientPool};
pub use termini::TerminusResolver;
pub use walker::{HierarchyWalker, BadHashes, Propagation};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("header not found: {hash}")]
    HeaderNotFound { hash: Hash },

    #[error("no header at height {height}")]
    HeightNotFound { height: u64 },

    #[error("rpc error from {endpoint} ({code}): {message}")]
    Rpc { endpoint: String, code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid hierarchy shape: {0}")]
    Shape(String),

    #[error("{level} location index {index} out of range for branching factor {branching} (header {hash})")]
    LocationOutOfRange { level: Level, index: usize, branching: usize, hash: Hash },

    #[error("endpoint not connected: {0}")]
    NotConnected(String),

    #[error("{level} walk from {reference} did not reach genesis within {steps} steps ({filled} slots filled)")]
    StuckWalk { level: Level, reference: Hash, steps: usize, filled: usize },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, HierarchyError>;
