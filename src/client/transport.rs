//! Realtime transports for the client.
//!
//! The client loop only sees text frames through [`Transport`]; a
//! [`Connector`] opens a fresh transport for every (re)connect attempt.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{ClientError, ClientResult};

#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: String) -> ClientResult<()>;

    /// Next text frame. `None` means the server closed the connection.
    async fn recv(&mut self) -> Option<ClientResult<String>>;

    async fn close(&mut self) -> ClientResult<()>;
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> ClientResult<Self::Transport>;
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: String) -> ClientResult<()> {
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ClientResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

/// Connects to `/api/ws/connect` for one session and player
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `base_url` is the HTTP base of the server, e.g. `http://localhost:8080`
    pub fn new(base_url: &str, session_id: &str, player_id: &str) -> ClientResult<Self> {
        let mut url = reqwest::Url::parse(base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base url: {}", e)))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Transport(format!("cannot use {} for {}", scheme, base_url)))?;
        url.set_path("/api/ws/connect");
        url.query_pairs_mut()
            .clear()
            .append_pair("sessionId", session_id)
            .append_pair("playerId", player_id);

        Ok(Self {
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> ClientResult<WsTransport> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        tracing::debug!("Connected to {}", self.url);
        Ok(WsTransport { stream })
    }
}
