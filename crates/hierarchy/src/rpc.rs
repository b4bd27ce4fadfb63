//! JSON-RPC over HTTP chain client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ChainClient, Coordinate, Dialer, Hash, Header, HierarchyError, Result};

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Header as served by a node: one parent/number per tier, location as hex bytes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHeader {
    hash: Hash,
    parent_hash: Vec<Hash>,
    number: Vec<String>,
    #[serde(default)]
    location: String,
}

impl TryFrom<WireHeader> for Header {
    type Error = HierarchyError;

    fn try_from(w: WireHeader) -> Result<Self> {
        let parent_hashes: [Hash; 3] = w.parent_hash.try_into().map_err(|v: Vec<Hash>| {
            HierarchyError::Decode(format!("expected 3 parent hashes, got {}", v.len()))
        })?;

        if w.number.len() != 3 {
            return Err(HierarchyError::Decode(format!(
                "expected 3 numbers, got {}",
                w.number.len()
            )));
        }
        let mut numbers = [0u64; 3];
        for (slot, raw) in numbers.iter_mut().zip(&w.number) {
            *slot = decode_quantity(raw)?;
        }

        let loc_hex = w.location.trim_start_matches("0x");
        let loc = hex::decode(loc_hex)
            .map_err(|e| HierarchyError::Decode(format!("location {}: {e}", w.location)))?;
        let location = Coordinate::new(
            loc.first().copied().unwrap_or(0) as usize,
            loc.get(1).copied().unwrap_or(0) as usize,
        );

        Ok(Header { hash: w.hash, parent_hashes, numbers, location })
    }
}

fn decode_quantity(raw: &str) -> Result<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| HierarchyError::Decode(format!("quantity {raw} is missing 0x prefix")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| HierarchyError::Decode(format!("quantity {raw}: {e}")))
}

/// Height as the node expects it in `getHeaderByNumber`: `0x` + upper-case hex
pub fn encode_height(height: u64) -> String {
    format!("0x{height:X}")
}

pub struct RpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Build the client and make sure the node answers
    pub async fn connect(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let c = Self::new(url, timeout)?;
        c.request("net_version", Value::Array(vec![])).await?;
        Ok(c)
    }

    /// Raw call. `Ok(None)` means the node answered with a `null` result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Option<Value>> {
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: JsonRpcResponse = resp.json().await?;

        if let Some(err) = body.error {
            return Err(HierarchyError::Rpc {
                endpoint: self.url.clone(),
                code: err.code,
                message: err.message,
            });
        }

        Ok(body.result.filter(|v| !v.is_null()))
    }

    async fn fetch_header(&self, method: &str, params: Value) -> Result<Option<Header>> {
        let Some(value) = self.request(method, params).await? else {
            return Ok(None);
        };
        let wire: WireHeader =
            serde_json::from_value(value).map_err(|e| HierarchyError::Decode(e.to_string()))?;
        Header::try_from(wire).map(Some)
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn header_by_hash(&self, hash: Hash) -> Result<Header> {
        debug!(url=%self.url, %hash, "rpc: header by hash");
        self.fetch_header("quai_getHeaderByHash", serde_json::json!([hash]))
            .await?
            .ok_or(HierarchyError::HeaderNotFound { hash })
    }

    async fn header_by_number(&self, height: u64) -> Result<Header> {
        debug!(url=%self.url, height, "rpc: header by number");
        self.fetch_header("quai_getHeaderByNumber", serde_json::json!([encode_height(height)]))
            .await?
            .ok_or(HierarchyError::HeightNotFound { height })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Dials JSON-RPC endpoints, probing each one once
#[derive(Clone, Debug)]
pub struct RpcDialer {
    timeout: Duration,
}

impl RpcDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dialer for RpcDialer {
    type Client = RpcClient;

    async fn dial(&self, url: &str) -> Result<RpcClient> {
        RpcClient::connect(url, self.timeout).await
    }
}
