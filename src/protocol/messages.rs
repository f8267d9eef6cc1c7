//! Wire Messages Module
//!
//! Defines the closed set of request/response message variants exchanged
//! between client and server, and the response envelope used to correlate
//! responses back to their originating request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::models::{CacheItem, KeyFilter};

// == Response Envelope ==
/// Correlation envelope carried by every response message.
///
/// `message_id` equals the id of the request being answered. A request is
/// complete once a part with `is_more == false` arrives; earlier parts carry
/// `is_more == true` and increasing `sequence` numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Id of the request this response answers
    pub message_id: Uuid,
    /// Part number, starting at 1
    pub sequence: u32,
    /// Whether more parts follow for the same request
    pub is_more: bool,
    /// Error code, None on success
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    /// Error message, None on success
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ResponseEnvelope {
    // == Constructor ==
    /// Creates a successful single-part envelope for `message_id`.
    pub fn single(message_id: Uuid) -> Self {
        Self {
            message_id,
            sequence: 1,
            is_more: false,
            error_code: None,
            error_message: None,
        }
    }

    // == Error ==
    /// Marks the envelope with an error code and its default description.
    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self.error_message = Some(code.description().to_string());
        self
    }

    /// Marks the envelope with an error code and a specific message.
    pub fn with_error_message(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.error_code = Some(code);
        self.error_message = Some(message.into());
        self
    }

    /// Returns the error code and message when the envelope carries one.
    pub fn error(&self) -> Option<(ErrorCode, String)> {
        self.error_code.map(|code| {
            let message = self
                .error_message
                .clone()
                .unwrap_or_else(|| code.description().to_string());
            (code, message)
        })
    }
}

// == Request Header ==
/// Fields shared by every request: a fresh unique id and the security key
/// authorizing the request against one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Unique request id, generated by the caller
    pub id: Uuid,
    /// Shared secret for the target environment
    pub security_key: String,
}

impl RequestHeader {
    /// Creates a header with a fresh request id.
    pub fn new(security_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            security_key: security_key.into(),
        }
    }
}

// == Message ==
/// The closed set of messages understood by the cache server.
///
/// Requests carry a [`RequestHeader`]; responses carry a
/// [`ResponseEnvelope`] referencing the request id. Each request type has
/// exactly one possible response type, so correlation matches purely on id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Add or replace one cache item
    AddItemRequest {
        header: RequestHeader,
        item: CacheItem,
    },
    AddItemResponse { response: ResponseEnvelope },

    /// Fetch one cache item by key
    GetItemRequest {
        header: RequestHeader,
        key: String,
    },
    GetItemResponse {
        response: ResponseEnvelope,
        item: Option<CacheItem>,
    },

    /// Delete one cache item by key; an empty key deletes all items
    DeleteItemRequest {
        header: RequestHeader,
        key: String,
    },
    DeleteItemResponse { response: ResponseEnvelope },

    /// Enumerate keys matching a filter
    GetKeysRequest {
        header: RequestHeader,
        filter: KeyFilter,
    },
    GetKeysResponse {
        response: ResponseEnvelope,
        keys: Vec<String>,
    },
}

impl Message {
    // == Type Name ==
    /// Short name of the message variant, used for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::AddItemRequest { .. } => "AddItemRequest",
            Message::AddItemResponse { .. } => "AddItemResponse",
            Message::GetItemRequest { .. } => "GetItemRequest",
            Message::GetItemResponse { .. } => "GetItemResponse",
            Message::DeleteItemRequest { .. } => "DeleteItemRequest",
            Message::DeleteItemResponse { .. } => "DeleteItemResponse",
            Message::GetKeysRequest { .. } => "GetKeysRequest",
            Message::GetKeysResponse { .. } => "GetKeysResponse",
        }
    }

    // == Request Accessors ==
    /// Returns the request header when this message is a request.
    pub fn header(&self) -> Option<&RequestHeader> {
        match self {
            Message::AddItemRequest { header, .. }
            | Message::GetItemRequest { header, .. }
            | Message::DeleteItemRequest { header, .. }
            | Message::GetKeysRequest { header, .. } => Some(header),
            _ => None,
        }
    }

    /// Returns the request id when this message is a request.
    pub fn request_id(&self) -> Option<Uuid> {
        self.header().map(|h| h.id)
    }

    // == Response Accessors ==
    /// Returns the response envelope when this message is a response.
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            Message::AddItemResponse { response }
            | Message::GetItemResponse { response, .. }
            | Message::DeleteItemResponse { response }
            | Message::GetKeysResponse { response, .. } => Some(response),
            _ => None,
        }
    }
}
