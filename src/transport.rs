//! Transport Adapter Module
//!
//! Abstracts the connectionless message transport. The core only needs a
//! way to send a message to an endpoint and a channel of inbound messages;
//! no ordering or delivery guarantees are assumed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::protocol::Message;

/// Maximum accepted datagram size in bytes.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

// == Inbound Message ==
/// One message received from the transport, with its sender's address.
#[derive(Debug)]
pub struct Inbound {
    /// The decoded message
    pub message: Message,
    /// Address of the sending endpoint
    pub sender: SocketAddr,
}

// == Transport Trait ==
/// Send side of a message transport.
///
/// Implementations must be cheap to share; the correlation layer and the
/// worker both hold a clone behind an `Arc`.
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the given endpoint.
    fn send(&self, message: &Message, endpoint: SocketAddr)
        -> impl Future<Output = Result<()>> + Send;

    /// Stops delivering inbound messages. Sending stays possible so that
    /// in-flight work can still reply.
    fn stop_listening(&self);
}

// == UDP Transport ==
/// UDP adapter encoding each message as one JSON datagram.
///
/// Binding spawns a receive loop that decodes datagrams and forwards them
/// on the inbound channel. Undecodable datagrams are logged and discarded.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    recv_task: JoinHandle<()>,
}

impl UdpTransport {
    // == Bind ==
    /// Binds a socket on `addr` and starts listening.
    ///
    /// Returns the transport plus the channel of inbound messages.
    pub async fn bind(addr: SocketAddr) -> Result<(Self, mpsc::Receiver<Inbound>)> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| CacheError::Transport(format!("Failed to bind {addr}: {e}")))?;
        let socket = Arc::new(socket);

        let (tx, rx) = mpsc::channel(256);
        let recv_socket = Arc::clone(&socket);
        let recv_task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, sender)) => match serde_json::from_slice::<Message>(&buf[..len]) {
                        Ok(message) => {
                            debug!("Received {} from {}", message.type_name(), sender);
                            if tx.send(Inbound { message, sender }).await.is_err() {
                                // Receiver dropped, nobody is listening anymore
                                break;
                            }
                        }
                        Err(e) => warn!("Discarding undecodable datagram from {}: {}", sender, e),
                    },
                    Err(e) => {
                        warn!("Transport receive error: {}", e);
                    }
                }
            }
        });

        Ok((
            Self { socket, recv_task },
            rx,
        ))
    }

    // == Local Address ==
    /// Returns the bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| CacheError::Transport(format!("Failed to get local address: {e}")))
    }

}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

impl Transport for UdpTransport {
    fn send(
        &self,
        message: &Message,
        endpoint: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send {
        let encoded = serde_json::to_vec(message)
            .map_err(|e| CacheError::Transport(format!("Failed to encode message: {e}")));
        let socket = Arc::clone(&self.socket);
        async move {
            let bytes = encoded?;
            if bytes.len() > MAX_DATAGRAM_SIZE {
                return Err(CacheError::Transport(format!(
                    "Message of {} bytes exceeds maximum datagram size",
                    bytes.len()
                )));
            }
            socket
                .send_to(&bytes, endpoint)
                .await
                .map_err(|e| CacheError::Transport(format!("Failed to send to {endpoint}: {e}")))?;
            Ok(())
        }
    }

    fn stop_listening(&self) {
        self.recv_task.abort();
    }
}

// == Test Transports ==
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Transport that records every sent message for assertions.
    pub struct CaptureTransport {
        pub sent: Mutex<Vec<(Message, SocketAddr)>>,
        pub stopped: AtomicBool,
    }

    impl CaptureTransport {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }
        }

        pub fn sent_messages(&self) -> Vec<Message> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(message, _)| message.clone())
                .collect()
        }

        pub fn is_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    impl Transport for CaptureTransport {
        fn send(
            &self,
            message: &Message,
            endpoint: SocketAddr,
        ) -> impl Future<Output = Result<()>> + Send {
            self.sent.lock().unwrap().push((message.clone(), endpoint));
            async { Ok(()) }
        }

        fn stop_listening(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestHeader, ResponseEnvelope};
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive_roundtrip() {
        let (sender, _sender_rx) = UdpTransport::bind(loopback()).await.unwrap();
        let (receiver, mut receiver_rx) = UdpTransport::bind(loopback()).await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let message = Message::GetItemRequest {
            header: RequestHeader::new("secret"),
            key: "k".to_string(),
        };
        sender.send(&message, receiver_addr).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), receiver_rx.recv())
            .await
            .expect("timed out waiting for datagram")
            .expect("channel closed");
        assert_eq!(inbound.message, message);
    }

    #[tokio::test]
    async fn test_response_messages_carry_sender_address() {
        let (sender, _sender_rx) = UdpTransport::bind(loopback()).await.unwrap();
        let sender_addr = sender.local_addr().unwrap();
        let (receiver, mut receiver_rx) = UdpTransport::bind(loopback()).await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let message = Message::DeleteItemResponse {
            response: ResponseEnvelope::single(uuid::Uuid::new_v4()),
        };
        sender.send(&message, receiver_addr).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), receiver_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.sender.port(), sender_addr.port());
    }

    #[tokio::test]
    async fn test_stop_listening_closes_inbound_channel() {
        let (transport, mut rx) = UdpTransport::bind(loopback()).await.unwrap();
        transport.stop_listening();

        // The receive task is gone, so the channel drains to None
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("channel should close after stop_listening");
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_oversized_message_is_rejected() {
        let (transport, _rx) = UdpTransport::bind(loopback()).await.unwrap();
        let target = transport.local_addr().unwrap();

        let message = Message::AddItemRequest {
            header: RequestHeader::new("secret"),
            item: crate::models::CacheItem::new(
                "big",
                vec![0u8; MAX_DATAGRAM_SIZE],
                "bytes",
                0,
                false,
            ),
        };
        let result = transport.send(&message, target).await;
        assert!(matches!(result, Err(CacheError::Transport(_))));
    }
}
