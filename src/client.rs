//! Cache Client Module
//!
//! Typed facade over the correlation layer. Each method builds one request,
//! waits for the correlated response, and surfaces wire error codes as
//! [`CacheError`] values. Values can be stored raw or as JSON documents.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::models::{CacheItem, KeyFilter};
use crate::protocol::{Correlator, Message, RequestHeader, DEFAULT_RESPONSE_TIMEOUT};
use crate::transport::{Inbound, Transport, UdpTransport};

/// Value type tag for JSON-encoded items.
pub const JSON_VALUE_TYPE: &str = "json";

// == Cache Client ==
/// Client handle for one cache environment.
///
/// Cloning is cheap; clones share the underlying transport and correlation
/// state, so concurrent calls from multiple tasks are supported.
pub struct CacheClient<T: Transport> {
    correlator: Correlator<T>,
    server: SocketAddr,
    security_key: String,
}

impl<T: Transport> Clone for CacheClient<T> {
    fn clone(&self) -> Self {
        Self {
            correlator: self.correlator.clone(),
            server: self.server,
            security_key: self.security_key.clone(),
        }
    }
}

impl CacheClient<UdpTransport> {
    // == Connect ==
    /// Binds a local socket and targets `server` with the default timeout.
    pub async fn connect(server: SocketAddr, security_key: impl Into<String>) -> Result<Self> {
        Self::connect_with_timeout(server, security_key, DEFAULT_RESPONSE_TIMEOUT).await
    }

    /// Binds a local socket and targets `server`, waiting at most
    /// `response_timeout` for each response.
    pub async fn connect_with_timeout(
        server: SocketAddr,
        security_key: impl Into<String>,
        response_timeout: Duration,
    ) -> Result<Self> {
        let bind_addr: SocketAddr = "0.0.0.0:0"
            .parse()
            .map_err(|e| CacheError::Internal(format!("Invalid bind address: {e}")))?;
        let (transport, inbound) = UdpTransport::bind(bind_addr).await?;
        Ok(Self::new(
            Arc::new(transport),
            inbound,
            server,
            security_key,
            response_timeout,
        ))
    }
}

impl<T: Transport> CacheClient<T> {
    // == Constructor ==
    /// Builds a client over an already-bound transport.
    pub fn new(
        transport: Arc<T>,
        inbound: mpsc::Receiver<Inbound>,
        server: SocketAddr,
        security_key: impl Into<String>,
        response_timeout: Duration,
    ) -> Self {
        let correlator = Correlator::new(transport, response_timeout);
        // Clients only ever receive responses; anything else is dropped
        let _ = correlator.attach(inbound);
        Self {
            correlator,
            server,
            security_key: security_key.into(),
        }
    }

    fn header(&self) -> RequestHeader {
        RequestHeader::new(&self.security_key)
    }

    // == Add ==
    /// Stores one item, replacing any existing item under the same key.
    ///
    /// # Arguments
    /// * `item` - The item to store; `expiry_millis == 0` means no expiry
    pub async fn add(&self, item: CacheItem) -> Result<()> {
        let request = Message::AddItemRequest {
            header: self.header(),
            item,
        };
        let parts = self.correlator.call(request, self.server).await?;
        check(&parts)
    }

    /// Stores `value` serialized as a JSON document under `key`.
    pub async fn add_json<V: Serialize>(
        &self,
        key: impl Into<String>,
        value: &V,
        expiry_millis: u64,
        persist: bool,
    ) -> Result<()> {
        let encoded = serde_json::to_vec(value)
            .map_err(|e| CacheError::InvalidParameters(format!("Failed to encode value: {e}")))?;
        self.add(CacheItem::new(key, encoded, JSON_VALUE_TYPE, expiry_millis, persist))
            .await
    }

    // == Get ==
    /// Fetches the item under `key`, or None when absent or expired.
    pub async fn get(&self, key: impl Into<String>) -> Result<Option<CacheItem>> {
        let request = Message::GetItemRequest {
            header: self.header(),
            key: key.into(),
        };
        let parts = self.correlator.call(request, self.server).await?;
        check(&parts)?;

        for part in parts {
            if let Message::GetItemResponse { item, .. } = part {
                return Ok(item);
            }
        }
        Ok(None)
    }

    /// Fetches and decodes a JSON document stored under `key`.
    pub async fn get_json<V: DeserializeOwned>(&self, key: impl Into<String>) -> Result<Option<V>> {
        match self.get(key).await? {
            Some(item) => {
                let value = serde_json::from_slice(&item.value).map_err(|e| {
                    CacheError::Internal(format!("Failed to decode stored value: {e}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // == Delete ==
    /// Deletes the item under `key`. Deleting an absent key succeeds.
    pub async fn delete(&self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        debug!("Deleting key {:?}", key);
        let request = Message::DeleteItemRequest {
            header: self.header(),
            key,
        };
        let parts = self.correlator.call(request, self.server).await?;
        check(&parts)
    }

    /// Deletes every item in the environment.
    pub async fn delete_all(&self) -> Result<()> {
        // An empty key addresses the whole environment
        self.delete("").await
    }

    // == Keys ==
    /// Lists keys matching `filter`, sorted ascending.
    pub async fn keys_by_filter(&self, filter: KeyFilter) -> Result<Vec<String>> {
        let request = Message::GetKeysRequest {
            header: self.header(),
            filter,
        };
        let parts = self.correlator.call(request, self.server).await?;
        check(&parts)?;

        let mut keys = Vec::new();
        for part in parts {
            if let Message::GetKeysResponse { keys: mut chunk, .. } = part {
                keys.append(&mut chunk);
            }
        }
        Ok(keys)
    }

    /// Lists every key in the environment, sorted ascending.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.keys_by_filter(KeyFilter::all()).await
    }
}

// == Response Checking ==
/// Maps an error-coded response to the matching [`CacheError`].
fn check(parts: &[Message]) -> Result<()> {
    let Some(first) = parts.first() else {
        return Err(CacheError::Internal("Empty response".to_string()));
    };
    let Some(envelope) = first.response() else {
        return Err(CacheError::Internal(format!(
            "{} is not a response",
            first.type_name()
        )));
    };
    match envelope.error() {
        Some((code, message)) => Err(CacheError::from_wire(code, message)),
        None => Ok(()),
    }
}
