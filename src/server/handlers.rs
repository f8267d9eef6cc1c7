//! Request Handlers
//!
//! Processes one decoded client request: authorizes it against the
//! environment registry, validates parameters, performs the cache engine
//! operation and sends the single-part response back to the sender.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::models::{CacheItem, Environment, KeyFilter};
use crate::protocol::{Message, RequestHeader, ResponseEnvelope};
use crate::registry::{EnvironmentRegistry, SharedEngine};
use crate::transport::Transport;

// == Server Context ==
/// Shared state handed to every processing task.
pub struct ServerContext<T: Transport> {
    pub registry: Arc<EnvironmentRegistry>,
    pub transport: Arc<T>,
}

impl<T: Transport> ServerContext<T> {
    /// Creates the context shared by all processing tasks.
    pub fn new(registry: Arc<EnvironmentRegistry>, transport: Arc<T>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    // == Process ==
    /// Processes one inbound request and replies to `sender`.
    ///
    /// Errors escaping a handler are caught here and converted into an
    /// Unknown-coded response; they never propagate into the scheduler.
    pub async fn process(&self, message: Message, sender: SocketAddr) {
        let Some(header) = message.header() else {
            debug!("Ignoring non-request {} from {}", message.type_name(), sender);
            return;
        };
        let request_id = header.id;

        let response = match self.handle_request(&message).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing {}: {:#}", message.type_name(), e);
                match unknown_response(&message, request_id, &e) {
                    Some(response) => response,
                    None => return,
                }
            }
        };

        if let Err(e) = self.transport.send(&response, sender).await {
            warn!("Failed to send {} to {}: {}", response.type_name(), sender, e);
        }
    }

    /// Dispatches on the request variant.
    async fn handle_request(&self, message: &Message) -> anyhow::Result<Message> {
        match message {
            Message::AddItemRequest { header, item } => {
                Ok(self.handle_add(header, item.clone()).await)
            }
            Message::GetItemRequest { header, key } => Ok(self.handle_get(header, key).await),
            Message::DeleteItemRequest { header, key } => {
                Ok(self.handle_delete(header, key).await)
            }
            Message::GetKeysRequest { header, filter } => {
                Ok(self.handle_keys(header, filter).await)
            }
            other => anyhow::bail!("{} is not a request", other.type_name()),
        }
    }

    // == Authorize ==
    /// Resolves the environment for a request's security key and obtains
    /// its engine. A mismatch yields `PermissionDenied` and skips all
    /// further work; no engine is ever touched.
    async fn authorize(
        &self,
        header: &RequestHeader,
    ) -> Result<(Environment, SharedEngine), ErrorCode> {
        let environment = self
            .registry
            .resolve_by_security_key(&header.security_key)
            .await
            .ok_or(ErrorCode::PermissionDenied)?;

        let engine = self
            .registry
            .engine_for(&environment.id, true)
            .await
            .ok_or(ErrorCode::CacheEnvironmentNotFound)?;

        Ok((environment, engine))
    }

    // == Add ==
    /// Validates and stores one item.
    ///
    /// Key presence/length and capacity are enforced here, before the
    /// engine mutates anything; the capacity check and the add happen
    /// under one engine lock so concurrent adds cannot overshoot.
    async fn handle_add(&self, header: &RequestHeader, item: CacheItem) -> Message {
        let envelope = ResponseEnvelope::single(header.id);

        let (environment, engine) = match self.authorize(header).await {
            Ok(pair) => pair,
            Err(code) => {
                return Message::AddItemResponse {
                    response: envelope.with_error(code),
                }
            }
        };

        if item.key.trim().is_empty() {
            return Message::AddItemResponse {
                response: envelope.with_error_message(
                    ErrorCode::InvalidParameters,
                    format!("{}: Key is not set", ErrorCode::InvalidParameters.description()),
                ),
            };
        }
        if environment.max_key_length > 0 && item.key.len() > environment.max_key_length {
            return Message::AddItemResponse {
                response: envelope.with_error_message(
                    ErrorCode::InvalidParameters,
                    format!("{}: Key is too long", ErrorCode::InvalidParameters.description()),
                ),
            };
        }

        let mut store = engine.lock().await;
        if environment.max_size_bytes > 0
            && store.total_size() + item.size() > environment.max_size_bytes
        {
            return Message::AddItemResponse {
                response: envelope.with_error(ErrorCode::CacheFull),
            };
        }

        info!("Adding {} to cache for environment {}", item.key, environment.id);
        store.add(item);

        Message::AddItemResponse { response: envelope }
    }

    // == Get ==
    /// Fetches one item; expired items read as absent.
    async fn handle_get(&self, header: &RequestHeader, key: &str) -> Message {
        let envelope = ResponseEnvelope::single(header.id);

        let (_, engine) = match self.authorize(header).await {
            Ok(pair) => pair,
            Err(code) => {
                return Message::GetItemResponse {
                    response: envelope.with_error(code),
                    item: None,
                }
            }
        };

        let item = engine.lock().await.get(key);
        Message::GetItemResponse {
            response: envelope,
            item,
        }
    }

    // == Delete ==
    /// Deletes one item, or clears the environment when the key is empty.
    async fn handle_delete(&self, header: &RequestHeader, key: &str) -> Message {
        let envelope = ResponseEnvelope::single(header.id);

        let (environment, engine) = match self.authorize(header).await {
            Ok(pair) => pair,
            Err(code) => {
                return Message::DeleteItemResponse {
                    response: envelope.with_error(code),
                }
            }
        };

        let mut store = engine.lock().await;
        if key.is_empty() {
            store.delete_all();
            info!("Cleared cache for environment {}", environment.id);
        } else if store.delete(key) {
            info!("Deleted cache item {}", key);
        }

        Message::DeleteItemResponse { response: envelope }
    }

    // == Keys ==
    /// Enumerates keys matching a filter.
    async fn handle_keys(&self, header: &RequestHeader, filter: &KeyFilter) -> Message {
        let envelope = ResponseEnvelope::single(header.id);

        let (_, engine) = match self.authorize(header).await {
            Ok(pair) => pair,
            Err(code) => {
                return Message::GetKeysResponse {
                    response: envelope.with_error(code),
                    keys: Vec::new(),
                }
            }
        };

        let keys = engine.lock().await.keys_by_filter(filter);
        Message::GetKeysResponse {
            response: envelope,
            keys,
        }
    }
}

/// Builds the variant-correct Unknown-coded response for a failed request.
fn unknown_response(request: &Message, request_id: Uuid, error: &anyhow::Error) -> Option<Message> {
    let envelope = ResponseEnvelope::single(request_id).with_error_message(
        ErrorCode::Unknown,
        format!("{}: {}", ErrorCode::Unknown.description(), error),
    );
    match request {
        Message::AddItemRequest { .. } => Some(Message::AddItemResponse { response: envelope }),
        Message::GetItemRequest { .. } => Some(Message::GetItemResponse {
            response: envelope,
            item: None,
        }),
        Message::DeleteItemRequest { .. } => {
            Some(Message::DeleteItemResponse { response: envelope })
        }
        Message::GetKeysRequest { .. } => Some(Message::GetKeysResponse {
            response: envelope,
            keys: Vec::new(),
        }),
        _ => None,
    }
}
