//! Transport contract consumed by the remote adapter.
//!
//! The sync core never frames bytes itself: it talks to an [`Endpoint`]
//! that receives [`RemoteMessage`]s and sends [`ClientMessage`]s. Endpoints
//! are produced by a [`Connector`] so a binding can reconnect after loss.

use crate::protocol::{ClientMessage, RemoteMessage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Common boxed stream for transport endpoints.
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = Result<T, TransportError>> + Send>>;

/// Client-side endpoint of the sync protocol.
pub type ClientEndpoint = Arc<dyn Endpoint<RemoteMessage, ClientMessage>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("closed")]
    Closed,
    #[error("io: {0}")]
    Io(String),
    /// One inbound frame could not be decoded by a framing endpoint; the
    /// stream stays usable.
    #[error("decode: {0}")]
    Decode(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Generic endpoint view.
///
/// A caller only needs recv/send from one side;
/// direction is encoded at type-level by `RecvMsg` and `SendMsg`.
/// `recv` hands out the inbound stream once; later calls fail with
/// [`TransportError::Closed`].
#[async_trait]
pub trait Endpoint<RecvMsg, SendMsg>: Send + Sync
where
    RecvMsg: Send + 'static,
    SendMsg: Send + 'static,
{
    async fn recv(&self) -> Result<BoxStream<RecvMsg>, TransportError>;
    async fn send(&self, item: SendMsg) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens client endpoints, once per (re)connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<ClientEndpoint, TransportError>;
}

/// Endpoint backed by one receiver + one sender.
///
/// `close` drops the sending half, so the peer observes end-of-stream.
pub struct ChannelEndpoint<RecvMsg, SendMsg>
where
    RecvMsg: Send + 'static,
    SendMsg: Send + 'static,
{
    recv_rx: Mutex<Option<mpsc::UnboundedReceiver<RecvMsg>>>,
    send_tx: Mutex<Option<mpsc::UnboundedSender<SendMsg>>>,
}

impl<RecvMsg, SendMsg> ChannelEndpoint<RecvMsg, SendMsg>
where
    RecvMsg: Send + 'static,
    SendMsg: Send + 'static,
{
    pub fn new(
        recv_rx: mpsc::UnboundedReceiver<RecvMsg>,
        send_tx: mpsc::UnboundedSender<SendMsg>,
    ) -> Self {
        Self {
            recv_rx: Mutex::new(Some(recv_rx)),
            send_tx: Mutex::new(Some(send_tx)),
        }
    }

    /// Two endpoints wired back to back.
    pub fn pair() -> (Self, ChannelEndpoint<SendMsg, RecvMsg>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel::<SendMsg>();
        let (b_tx, b_rx) = mpsc::unbounded_channel::<RecvMsg>();
        (
            ChannelEndpoint::new(b_rx, a_tx),
            ChannelEndpoint::new(a_rx, b_tx),
        )
    }
}

#[async_trait]
impl<RecvMsg, SendMsg> Endpoint<RecvMsg, SendMsg> for ChannelEndpoint<RecvMsg, SendMsg>
where
    RecvMsg: Send + 'static,
    SendMsg: Send + 'static,
{
    async fn recv(&self) -> Result<BoxStream<RecvMsg>, TransportError> {
        let mut guard = self.recv_rx.lock().await;
        let mut rx = guard.take().ok_or(TransportError::Closed)?;
        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield Ok(item);
            }
        };
        Ok(Box::pin(stream))
    }

    async fn send(&self, item: SendMsg) -> Result<(), TransportError> {
        let guard = self.send_tx.lock().await;
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        tx.send(item).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.send_tx.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn channel_pair_bridges_both_directions() {
        let (client, server) = ChannelEndpoint::<String, u32>::pair();

        client.send(7).await.expect("client send");
        server.send("evt".to_string()).await.expect("server send");

        let mut from_client = server.recv().await.expect("server recv");
        let mut from_server = client.recv().await.expect("client recv");
        assert_eq!(from_client.next().await.unwrap().unwrap(), 7);
        assert_eq!(from_server.next().await.unwrap().unwrap(), "evt");
    }

    #[tokio::test]
    async fn recv_called_twice_returns_closed() {
        let (client, _server) = ChannelEndpoint::<u32, u32>::pair();
        let _first = client.recv().await.unwrap();
        assert!(matches!(client.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn close_ends_peer_stream() {
        let (client, server) = ChannelEndpoint::<u32, u32>::pair();
        let mut inbound = server.recv().await.unwrap();

        client.send(1).await.unwrap();
        client.close().await.unwrap();

        assert_eq!(inbound.next().await.unwrap().unwrap(), 1);
        assert!(inbound.next().await.is_none());
        assert!(matches!(client.send(2).await, Err(TransportError::Closed)));
    }
}
