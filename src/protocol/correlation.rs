//! Message Correlation Module
//!
//! Turns the unreliable, connectionless transport into a call/response
//! abstraction: a request is sent, then the caller suspends until the
//! correlated response parts arrive or the deadline elapses.
//!
//! Responses are matched purely by `response.message_id` equality with the
//! request id. A request is complete once a part with `is_more == false`
//! arrives; earlier parts are buffered in arrival order and returned
//! together, tolerating parts that arrive out of strict sequence order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::protocol::Message;
use crate::transport::{Inbound, Transport};

/// Default timeout waiting for a terminal response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// == Pending Request ==
/// One outstanding call awaiting its response parts.
struct PendingRequest {
    /// Parts received so far, in arrival order
    parts: Vec<Message>,
    /// Completes the waiting caller with all collected parts
    complete: oneshot::Sender<Vec<Message>>,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, PendingRequest>>>;

// == Correlator ==
/// Client-side correlation layer over a [`Transport`].
///
/// Multiple outstanding requests are tracked concurrently, keyed by request
/// id; completion of one never blocks another.
pub struct Correlator<T: Transport> {
    transport: Arc<T>,
    pending: PendingMap,
    response_timeout: Duration,
}

impl<T: Transport> Clone for Correlator<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            pending: Arc::clone(&self.pending),
            response_timeout: self.response_timeout,
        }
    }
}

impl<T: Transport> Correlator<T> {
    // == Constructor ==
    /// Creates a correlator sending through `transport`.
    pub fn new(transport: Arc<T>, response_timeout: Duration) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            response_timeout,
        }
    }

    // == Attach ==
    /// Starts routing `inbound` messages.
    ///
    /// Responses matching a tracked request complete that request's waiter.
    /// Everything else is forwarded on the returned channel for the
    /// application to handle; unmatched responses are silently dropped, as
    /// the original caller may have retried or already given up.
    pub fn attach(&self, mut inbound: mpsc::Receiver<Inbound>) -> mpsc::Receiver<Inbound> {
        let (forward_tx, forward_rx) = mpsc::channel(256);
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            while let Some(received) = inbound.recv().await {
                if let Some(unmatched) = route_inbound(&pending, received).await {
                    // Application not keeping up is not a protocol failure
                    if let Err(e) = forward_tx.try_send(unmatched) {
                        warn!("Dropping unhandled inbound message: {}", e);
                    }
                }
            }
        });

        forward_rx
    }

    // == Call ==
    /// Sends `request` to `endpoint` and waits for all response parts.
    ///
    /// Returns the buffered parts in arrival order once the terminal part
    /// (`is_more == false`) arrives. On timeout the pending entry is removed
    /// and any partial buffer discarded; a late response for the abandoned
    /// id is dropped by the router without error.
    pub async fn call(&self, request: Message, endpoint: SocketAddr) -> Result<Vec<Message>> {
        let request_id = request.request_id().ok_or_else(|| {
            CacheError::Internal(format!("{} is not a request", request.type_name()))
        })?;

        let (complete_tx, complete_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id,
                PendingRequest {
                    parts: Vec::new(),
                    complete: complete_tx,
                },
            );
        }

        // Send failure means no wait is started
        if let Err(e) = self.transport.send(&request, endpoint).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.response_timeout, complete_rx).await {
            Ok(Ok(parts)) => Ok(parts),
            Ok(Err(_)) => Err(CacheError::Internal(
                "Response router stopped while waiting".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(CacheError::Timeout(format!(
                    "No response to {} within {:?}",
                    request.type_name(),
                    self.response_timeout
                )))
            }
        }
    }
}

// == Inbound Routing ==
/// Routes one inbound message.
///
/// Returns the message back when it is not a response for a tracked
/// request, so the caller can forward it to the application handler.
async fn route_inbound(pending: &PendingMap, received: Inbound) -> Option<Inbound> {
    let Some(envelope) = received.message.response() else {
        return Some(received);
    };

    let message_id = envelope.message_id;
    let is_terminal = !envelope.is_more;

    let mut pending = pending.lock().await;
    match pending.get_mut(&message_id) {
        Some(entry) => {
            entry.parts.push(received.message);
            if is_terminal {
                // Safe to unwrap the remove, the entry was just found
                let entry = pending.remove(&message_id).unwrap();
                // Waiter may have timed out between removal and completion
                let _ = entry.complete.send(entry.parts);
            }
            None
        }
        None => {
            debug!(
                "Dropping unmatched {} for request {}",
                received.message.type_name(),
                message_id
            );
            None
        }
    }
}
