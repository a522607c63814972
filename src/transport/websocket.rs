//! WebSocket transport implementation for the clipboard bridge
//!
//! A connection is split in two: the sending half lives in a
//! [`WsConnection`] that is shared by every task needing to write, the
//! receiving half is a [`FrameReader`] owned by the single receive loop.

use crate::transport::{Connection, ConnectionId, Message, Result, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig as ProtocolConfig;
use tokio_tungstenite::{
    accept_hdr_async_with_config, connect_async_with_config, tungstenite::Message as WsMessage,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Stream type on the peer side
pub type ClientStream = MaybeTlsStream<TcpStream>;

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint path of the channel
    pub path: String,

    /// Maximum message size
    pub max_message_size: usize,

    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            max_message_size: crate::MAX_PAYLOAD_SIZE,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WebSocketConfig {
    fn protocol_config(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// Build the channel URL a peer connects to
pub fn channel_url(host: &str, port: u16, path: &str) -> String {
    format!("ws://{}:{}{}", host, port, path)
}

/// Sending half of a WebSocket connection
pub struct WsConnection<S> {
    id: ConnectionId,
    remote: String,
    connected_at: DateTime<Utc>,
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
}

impl<S> WsConnection<S> {
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

#[async_trait]
impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::text(message.to_string())).await?;
        debug!(connection = %self.id, "Sent {} message", message.label());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Ping(Default::default())).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!(connection = %self.id, "Closing connection to {}", self.remote);
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => match TransportError::from(e) {
                TransportError::ConnectionClosed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Receiving half of a WebSocket connection
pub struct FrameReader<S> {
    id: ConnectionId,
    stream: SplitStream<WebSocketStream<S>>,
    idle_timeout: Option<Duration>,
    last_inbound: Instant,
}

impl<S> FrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Give up on the channel when no frame of any kind arrives for `limit`
    pub fn set_idle_timeout(&mut self, limit: Duration) {
        self.idle_timeout = Some(limit);
    }

    /// When the last frame, control frames included, was received
    pub fn last_inbound(&self) -> Instant {
        self.last_inbound
    }

    async fn next_frame(&mut self) -> Option<Result<WsMessage>> {
        let frame = match self.idle_timeout {
            Some(limit) => {
                let deadline = self.last_inbound + limit;
                match tokio::time::timeout_at(deadline, self.stream.next()).await {
                    Ok(frame) => frame,
                    Err(_) => {
                        debug!(connection = %self.id, "No frame received for {:?}", limit);
                        return Some(Err(TransportError::Timeout));
                    }
                }
            }
            None => self.stream.next().await,
        };

        if frame.is_some() {
            self.last_inbound = Instant::now();
        }
        frame.map(|frame| frame.map_err(TransportError::from))
    }

    /// Wait for the next application message
    ///
    /// Returns `None` once the other side closed the channel. Control frames
    /// are consumed here; pings are answered by tungstenite. With an idle
    /// timeout set, a silent channel yields [`TransportError::Timeout`].
    pub async fn next_text(&mut self) -> Option<Result<String>> {
        while let Some(frame) = self.next_frame().await {
            match frame {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        warn!(connection = %self.id, "Dropping binary frame that is not UTF-8: {}", e);
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    debug!(connection = %self.id, "Close frame received: {:?}", frame);
                    return None;
                }
                Ok(WsMessage::Ping(_)) => {
                    debug!(connection = %self.id, "Received ping, pong handled automatically");
                }
                Ok(WsMessage::Pong(_)) => {
                    debug!(connection = %self.id, "Received pong");
                }
                Ok(WsMessage::Frame(_)) => {
                    warn!(connection = %self.id, "Received unexpected raw frame");
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

fn split<S>(ws_stream: WebSocketStream<S>, remote: String) -> (Arc<WsConnection<S>>, FrameReader<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = Uuid::new_v4();
    let (sink, stream) = ws_stream.split();

    let connection = WsConnection {
        id,
        remote,
        connected_at: Utc::now(),
        sink: Mutex::new(sink),
    };

    let reader = FrameReader {
        id,
        stream,
        idle_timeout: None,
        last_inbound: Instant::now(),
    };

    (Arc::new(connection), reader)
}

/// Open the channel to the relay
#[instrument(skip(config))]
pub async fn connect(
    url: &str,
    config: &WebSocketConfig,
) -> Result<(Arc<WsConnection<ClientStream>>, FrameReader<ClientStream>)> {
    let (ws_stream, _response) = tokio::time::timeout(
        config.connect_timeout,
        connect_async_with_config(url, Some(config.protocol_config()), false),
    )
    .await
    .map_err(|_| TransportError::Timeout)?
    .map_err(|e| TransportError::Connection {
        message: format!("Failed to establish WebSocket connection to {}: {}", url, e),
    })?;

    info!("Connected to {}", url);
    Ok(split(ws_stream, url.to_string()))
}

/// TCP listener that upgrades accepted sockets on the channel path
pub struct WsListener {
    tcp_listener: TcpListener,
    config: WebSocketConfig,
}

impl WsListener {
    /// Bind the listening socket
    pub async fn bind(addr: &str, config: WebSocketConfig) -> Result<Self> {
        let tcp_listener = TcpListener::bind(addr).await?;
        info!("WebSocket listener started on {}{}", addr, config.path);
        Ok(Self {
            tcp_listener,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp_listener.local_addr()?)
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Accept a TCP connection; the upgrade happens in [`upgrade`]
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        Ok(self.tcp_listener.accept().await?)
    }
}

/// Perform the server side WebSocket handshake
///
/// Requests for any path other than the channel path get a 404.
pub async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    config: &WebSocketConfig,
) -> Result<(Arc<WsConnection<TcpStream>>, FrameReader<TcpStream>)> {
    let path = config.path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == path {
            Ok(response)
        } else {
            let mut error = ErrorResponse::new(Some(format!(
                "no channel at {}",
                request.uri().path()
            )));
            *error.status_mut() = StatusCode::NOT_FOUND;
            Err(error)
        }
    };

    let ws_stream = accept_hdr_async_with_config(stream, check_path, Some(config.protocol_config()))
        .await
        .map_err(|e| TransportError::WebSocket {
            message: format!("Failed to accept WebSocket connection from {}: {}", addr, e),
        })?;

    Ok(split(ws_stream, addr.to_string()))
}
