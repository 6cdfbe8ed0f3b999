//! WebSocket transport: one duplex connection per epoch.
//!
//! After the subscription is sent the stream is split.  The read half goes
//! to the listener; the write half is shared by the heartbeat and the
//! session manager behind a mutex, which serializes every send.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use bc_protocol::{SubscriptionRequest, TunnelIdentity};

use crate::types::AgentError;

/// The upgrade request for `url`, authenticated with `token`.
pub(crate) fn connect_request(url: &str, token: &str) -> Result<Request, AgentError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| AgentError::Config(format!("invalid endpoint {url}: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AgentError::Config(format!("invalid token: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

/// Byte stream a control-channel connection runs over.
pub trait Link: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Link for T {}

/// Stream produced by [`Transport::connect`].
pub type NetLink = MaybeTlsStream<TcpStream>;

/// A freshly connected, not yet split, control-channel connection.
pub struct Transport<S: Link = NetLink> {
    ws: WebSocketStream<S>,
}

impl Transport {
    /// Open the WebSocket with `Authorization: Bearer <token>`.
    pub async fn connect(url: &str, token: &str) -> Result<Self, AgentError> {
        let request = connect_request(url, token)?;
        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(Self { ws })
    }
}

impl<S: Link> Transport<S> {
    /// Wrap a WebSocket whose handshake is already done.
    pub fn from_stream(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }

    /// Send the subscription request.  Must be the first frame on the wire.
    pub async fn subscribe(&mut self, identity: &TunnelIdentity) -> Result<(), AgentError> {
        let json = bc_protocol::encode(&SubscriptionRequest::new(identity))
            .map_err(|e| AgentError::Other(e.into()))?;
        self.ws.send(Message::Text(json)).await?;
        Ok(())
    }

    pub fn split(self) -> (TransportSender<S>, TransportReceiver<S>) {
        let (sink, stream) = self.ws.split();
        (
            TransportSender {
                sink: Arc::new(Mutex::new(sink)),
            },
            TransportReceiver { stream },
        )
    }

    /// Close without ever splitting (used when the subscription fails).
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Shared write half.
pub struct TransportSender<S: Link = NetLink> {
    sink: Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>,
}

impl<S: Link> Clone for TransportSender<S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<S: Link> TransportSender<S> {
    /// Send unless `shutdown` is already requested.  The check happens while
    /// holding the write lock, and [`close`](Self::close) takes the same
    /// lock, so nothing goes out once the epoch has been shut down and
    /// closed.  Returns whether the frame was sent.
    pub async fn send_unless_cancelled(
        &self,
        text: String,
        shutdown: &CancellationToken,
    ) -> Result<bool, AgentError> {
        let mut sink = self.sink.lock().await;
        if shutdown.is_cancelled() {
            return Ok(false);
        }
        sink.send(Message::Text(text)).await?;
        Ok(true)
    }

    /// Send a close frame and shut the write side.  Errors are ignored: the
    /// connection may already be gone.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

/// Read half, owned by the listener.
pub struct TransportReceiver<S: Link = NetLink> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S: Link> TransportReceiver<S> {
    /// Wait for the next text frame.  Any error, a close frame, or the end
    /// of the stream is reported as an error: the epoch is over either way.
    pub async fn recv(&mut self) -> Result<String, AgentError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".into());
                    return Err(AgentError::WebSocket(format!("server closed connection: {reason}")));
                }
                // Binary frames are not part of the protocol; ping/pong are
                // answered by tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(AgentError::WebSocket("connection closed".into())),
            }
        }
    }
}
