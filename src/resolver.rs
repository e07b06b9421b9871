//! Resolves a contract address to its CosmWasm code ID.
//!
//! Consults a bounded LRU before calling out to the node's RPC. Misses are
//! retried up to three times with exponential backoff starting at 100ms. A
//! confirmed "not found" and an exhausted-retries error both cache the
//! sentinel `0` so the contract stays eligible for re-resolution on a later
//! batch.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ResolverError;
use crate::model::CodeId;

const CACHE_CAPACITY: usize = 1000;
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Transport used to fetch a contract's code ID from the node.
///
/// Kept as a trait so the pipeline's logic can be exercised without a live
/// RPC endpoint, the same way the CosmWasm keeper decouples itself from a
/// concrete VM backend via the `WasmEngine` trait.
#[async_trait]
pub trait CodeIdRpc: Send + Sync {
    /// Returns `Ok(Some(code_id))` if the contract exists, `Ok(None)` if the
    /// node reports it does not exist, or `Err` on any transport failure.
    async fn fetch_code_id(&self, address: &str) -> Result<Option<u64>, ResolverError>;
}

/// `reqwest`-backed implementation querying a node's REST/JSON contract info
/// endpoint, grounded in the typed-HTTP-client pattern used for RPC access
/// elsewhere in the pack.
#[derive(Debug, Clone)]
pub struct HttpCodeIdRpc {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCodeIdRpc {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ResolverError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct ContractInfoResponse {
    code_id: u64,
}

#[async_trait]
impl CodeIdRpc for HttpCodeIdRpc {
    async fn fetch_code_id(&self, address: &str) -> Result<Option<u64>, ResolverError> {
        let url = format!(
            "{}/cosmwasm/wasm/v1/contract/{}",
            self.base_url.trim_end_matches('/'),
            address
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolverError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ResolverError::Transport(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body: ContractInfoResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::MalformedResponse(e.to_string()))?;
        Ok(Some(body.code_id))
    }
}

/// The bounded, process-wide code-ID cache and its RPC transport.
pub struct Resolver {
    rpc: Arc<dyn CodeIdRpc>,
    cache: Mutex<LruCache<String, CodeId>>,
}

impl Resolver {
    pub fn new(rpc: Arc<dyn CodeIdRpc>) -> Self {
        Self {
            rpc,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Resolves `address` to its code ID, consulting the cache first.
    ///
    /// Never returns `Err`: after retries are exhausted the sentinel `0` is
    /// logged and cached so the pipeline can proceed.
    pub async fn resolve(&self, address: &str) -> CodeId {
        if let Some(cached) = self.cache.lock().await.get(address).copied() {
            return cached;
        }

        let resolved = self.resolve_with_retry(address).await;
        self.cache.lock().await.put(address.to_string(), resolved);
        resolved
    }

    async fn resolve_with_retry(&self, address: &str) -> CodeId {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.rpc.fetch_code_id(address).await {
                Ok(Some(code_id)) if code_id > 0 => return CodeId(code_id),
                Ok(Some(_)) | Ok(None) => return CodeId::UNKNOWN,
                Err(err) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        address,
                        attempt, error = %err, "code id resolution failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    warn!(
                        address,
                        error = %err,
                        "code id resolution exhausted retries, caching unknown"
                    );
                    return CodeId::UNKNOWN;
                }
            }
        }
        CodeId::UNKNOWN
    }
}
