//! WebSocket transport for camera and control links.
//!
//! Thin wrapper around `tokio-tungstenite` providing split reader/writer
//! halves. Links use this module rather than `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! [`connect`] bounds the handshake with a timeout and maps every failure to
//! [`ConsoleError::Transport`], so the reconnect loop can treat them alike.
//! The returned ([`WsWriter`], [`WsReader`]) pair is ready for use in
//! `tokio::select!` loops.
//!
//! Endpoint helpers turn the configured HTTP base URL into per-camera
//! WebSocket URLs.

// Rust guideline compliant 2026-02

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::constants::CAMERA_ID_PLACEHOLDER;
use crate::error::ConsoleError;
use crate::protocol::CameraId;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Inbound frame surfaced to a link.
#[derive(Debug)]
pub enum WsMessage {
    /// JSON text.
    Text(String),
    /// Binary payload. Links treat it as UTF-8 JSON.
    Binary(Vec<u8>),
    /// Ping that must be answered with a pong.
    Ping(Vec<u8>),
    /// Remote close.
    Close {
        /// Close code, 1005 when the peer sent none.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Sending side of a link connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Write one encoded command.
    pub async fn send_text(&mut self, text: String) -> Result<(), ConsoleError> {
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .map_err(|e| ConsoleError::Transport(format!("send failed: {e}")))
    }

    /// Answer a ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), ConsoleError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| ConsoleError::Transport(format!("pong failed: {e}")))
    }

    /// Send a close frame and shut the sink.
    pub async fn close(&mut self) -> Result<(), ConsoleError> {
        self.sink
            .send(tungstenite::Message::Close(None))
            .await
            .map_err(|e| ConsoleError::Transport(format!("close failed: {e}")))?;
        self.sink
            .close()
            .await
            .map_err(|e| ConsoleError::Transport(format!("close failed: {e}")))
    }
}

/// Receiving side of a link connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next frame a link cares about. `None` once the peer is gone.
    ///
    /// Pongs and raw frames are skipped.
    pub async fn recv(&mut self) -> Option<Result<WsMessage, ConsoleError>> {
        use tungstenite::Message;

        while let Some(next) = self.stream.next().await {
            let message = match next {
                Ok(Message::Text(text)) => WsMessage::Text(text),
                Ok(Message::Binary(data)) => WsMessage::Binary(data),
                Ok(Message::Ping(data)) => WsMessage::Ping(data),
                Ok(Message::Close(frame)) => match frame {
                    Some(frame) => WsMessage::Close {
                        code: frame.code.into(),
                        reason: frame.reason.into_owned(),
                    },
                    None => WsMessage::Close {
                        code: 1005,
                        reason: String::new(),
                    },
                },
                Ok(Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(ConsoleError::Transport(format!("read error: {e}")))),
            };
            return Some(Ok(message));
        }
        None
    }
}

/// Connect to a WebSocket URL, failing if the handshake exceeds `timeout`.
pub async fn connect(url: &str, timeout: Duration) -> Result<(WsWriter, WsReader), ConsoleError> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .map_err(|e| ConsoleError::Transport(format!("invalid WebSocket URL {url}: {e}")))?;

    let (ws_stream, _response) =
        match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(ConsoleError::Transport(format!(
                    "connect to {url} failed: {e}"
                )))
            }
            Err(elapsed) => {
                return Err(ConsoleError::Transport(format!(
                    "connect to {url} timed out after {timeout:?} ({elapsed})"
                )))
            }
        };

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Map an `http(s)://` URL onto `ws(s)://`. Other schemes are left alone.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Join a base URL and a path template into a WebSocket endpoint template.
#[must_use]
pub fn endpoint_template(base_url: &str, path_template: &str) -> String {
    format!(
        "{}/{}",
        http_to_ws_scheme(base_url).trim_end_matches('/'),
        path_template.trim_start_matches('/')
    )
}

/// Substitute a camera id into an endpoint template.
#[must_use]
pub fn camera_endpoint(template: &str, camera_id: &CameraId) -> String {
    template.replace(CAMERA_ID_PLACEHOLDER, camera_id.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(http_to_ws_scheme("https://rig.local"), "wss://rig.local");
        assert_eq!(http_to_ws_scheme("http://localhost:8000"), "ws://localhost:8000");
        assert_eq!(
            http_to_ws_scheme("ws://localhost:5000/socket"),
            "ws://localhost:5000/socket"
        );
        // Only the scheme is rewritten.
        assert_eq!(
            http_to_ws_scheme("http://proxy/?next=http://rig"),
            "ws://proxy/?next=http://rig"
        );
    }

    #[test]
    fn test_endpoint_template_joins_slashes() {
        assert_eq!(
            endpoint_template("http://localhost:8000/", "/ws/camera/{cameraId}"),
            "ws://localhost:8000/ws/camera/{cameraId}"
        );
    }

    #[test]
    fn test_camera_endpoint_substitutes_id() {
        let template = endpoint_template("https://rig.local", "/ws/camera/{cameraId}");
        assert_eq!(
            camera_endpoint(&template, &CameraId::from("3")),
            "wss://rig.local/ws/camera/3"
        );
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_transport_error() {
        let err = connect("not-a-url", Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let err = connect("ws://127.0.0.1:1/ws/camera/1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
