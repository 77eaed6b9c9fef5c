// src/network/transport.rs

//! Framed websocket transport
//!
//! Owns the socket side of a session: resolving the endpoint (optionally
//! tunneled through a proxy that decodes the real `host:port` from the
//! path), opening the websocket, writing one JSON object per line, and
//! splitting inbound payloads back into JSON values.
use crate::utils::error::MinerError;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;
use url::Url;

/// Inbound half of an open websocket
pub type FrameStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Lifecycle of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Frames can be sent
    Open,
    /// Closed by either side
    Closed,
    /// Socket failed
    Error,
}

/// Encodes a plaintext `host:port` so a tunneling proxy can recover it
pub fn encode_target(target: &str) -> String {
    B64.encode(target.as_bytes())
}

/// Inverse of [`encode_target`], as performed on the proxy side
pub fn decode_target(encoded: &str) -> Result<String, MinerError> {
    let bytes = B64
        .decode(encoded.as_bytes())
        .map_err(|e| MinerError::ConfigError(format!("Invalid tunnel target: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| MinerError::ConfigError(format!("Tunnel target is not UTF-8: {}", e)))
}

/// Returns true when `host` already names a full socket endpoint
pub fn is_endpoint_url(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    ["ws://", "wss://", "http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Resolves the URL the session connects to
///
/// A host given as a full endpoint URL is used verbatim. Otherwise the
/// proxy base is required and the base64 encoded `host:port` is appended
/// to it as the last path segment.
///
/// # Errors
/// Returns `MinerError::ConfigError` if:
/// - host is empty
/// - proxy is missing for a bare host
/// - port is missing or outside 1..=65535
pub fn resolve_socket_url(
    host: &str,
    proxy: Option<&str>,
    port: Option<i64>,
) -> Result<String, MinerError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(MinerError::ConfigError("Missing required config: host".into()));
    }

    if is_endpoint_url(host) {
        return Ok(host.to_string());
    }

    let proxy = proxy.map(str::trim).unwrap_or_default();
    if proxy.is_empty() {
        return Err(MinerError::ConfigError(
            "When host is not a full websocket URL, proxy is required".into(),
        ));
    }

    let port = port
        .filter(|p| *p > 0)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| MinerError::ConfigError("Missing or invalid port".into()))?;

    let base = proxy.trim_end_matches('/');
    Ok(format!("{}/{}", base, encode_target(&format!("{}:{}", host, port))))
}

/// Maps an http(s) proxy address onto the websocket scheme it serves
fn websocket_endpoint(url: &str) -> Result<Url, MinerError> {
    let mut parsed = Url::parse(url)?;
    let scheme = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Ok(parsed),
        other => {
            return Err(MinerError::ConfigError(format!(
                "Unsupported URL scheme '{}' in {}",
                other, url
            )));
        }
    };
    parsed
        .set_scheme(scheme)
        .map_err(|_| MinerError::ConfigError(format!("Cannot use {} as websocket URL", url)))?;
    Ok(parsed)
}

/// Splits one inbound payload into JSON values
///
/// A payload may carry several newline-joined objects. Lines that are not
/// valid JSON are dropped: tunneling proxies emit partial or non-protocol
/// chunks and those are not errors.
pub fn split_frame(payload: &str) -> Vec<Value> {
    payload
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(_) => {
                log::trace!("Dropping non-JSON chunk: {}", line);
                None
            }
        })
        .collect()
}

/// Extracts the text of a websocket message, if it carries any
pub fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_owned()),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        _ => None,
    }
}

/// Outbound handle of one live socket
///
/// Frames are queued to a writer task, so sending never blocks the
/// session. A closed or failed connection is never reused; reconnecting
/// creates a new `Connection`.
#[derive(Debug)]
pub struct Connection {
    /// Resolved target URL
    url: String,
    /// Current socket state
    state: ConnectionState,
    /// Queue drained by the writer task
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Creates an open connection whose frames land in the returned receiver
    pub fn channel(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            url: url.into(),
            state: ConnectionState::Open,
            outbound,
        };
        (conn, rx)
    }

    /// Target URL of this connection
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current socket state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while frames can be sent
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open && !self.outbound.is_closed()
    }

    /// Records a lifecycle transition observed by the reader
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Sends one JSON line
    ///
    /// # Errors
    /// Returns `MinerError::NotConnected` if the connection is not open
    pub fn send(&self, frame: &str) -> Result<(), MinerError> {
        if !self.is_open() {
            return Err(MinerError::NotConnected);
        }
        log::trace!("tx: {}", frame);
        self.outbound
            .send(format!("{}\n", frame))
            .map_err(|_| MinerError::NotConnected)
    }
}

/// Opens the websocket and starts its writer task
///
/// # Errors
/// Returns `MinerError` if:
/// - URL is invalid
/// - DNS resolution or TCP connect fails
/// - WebSocket handshake fails
pub async fn open(url: &str) -> Result<(Connection, FrameStream), MinerError> {
    let endpoint = websocket_endpoint(url)?;
    log::debug!("Connecting to {}", endpoint);

    let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .map_err(|e| MinerError::ConnectionError(format!("Connection to '{}' failed: {}", url, e)))?;

    let (mut sink, stream) = ws_stream.split();
    let (conn, mut rx) = Connection::channel(url);

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                log::warn!("Socket write failed: {}", e);
                return;
            }
        }
        // Connection handle dropped
        let _ = sink.close().await;
    });

    Ok((conn, stream))
}

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial` and capped at `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Backoff {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Back to the initial delay after a successful connect
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_is_tunneled_through_proxy() {
        let url =
            resolve_socket_url("pool.example.com", Some("https://proxy.example/"), Some(3333))
                .unwrap();
        assert_eq!(url, "https://proxy.example/cG9vbC5leGFtcGxlLmNvbTozMzMz");
    }

    #[test]
    fn trailing_slashes_are_trimmed_from_proxy() {
        let url =
            resolve_socket_url("stratum.pool.io", Some("wss://tunnel.io/ws///"), Some(4444))
                .unwrap();
        assert_eq!(url, "wss://tunnel.io/ws/c3RyYXR1bS5wb29sLmlvOjQ0NDQ=");
    }

    #[test]
    fn endpoint_host_is_used_verbatim() {
        let url = resolve_socket_url("wss://direct.example:8443/mine", None, None).unwrap();
        assert_eq!(url, "wss://direct.example:8443/mine");
        assert!(is_endpoint_url("WS://upper.example"));
    }

    #[test]
    fn tunnel_target_round_trips() {
        let target = "pool.example.com:3333";
        assert_eq!(decode_target(&encode_target(target)).unwrap(), target);
    }

    #[test]
    fn configuration_errors_are_reported() {
        for (host, proxy, port) in [
            ("", Some("https://p"), Some(1)),
            ("pool", None, Some(3333)),
            ("pool", Some("  "), Some(3333)),
            ("pool", Some("https://p"), None),
            ("pool", Some("https://p"), Some(0)),
            ("pool", Some("https://p"), Some(-5)),
            ("pool", Some("https://p"), Some(70000)),
        ] {
            let result = resolve_socket_url(host, proxy, port);
            assert!(
                matches!(result, Err(MinerError::ConfigError(_))),
                "expected config error for {:?}",
                (host, proxy, port)
            );
        }
    }

    #[test]
    fn proxy_scheme_maps_to_websocket() {
        assert_eq!(
            websocket_endpoint("https://proxy.example/abc").unwrap().as_str(),
            "wss://proxy.example/abc"
        );
        assert_eq!(
            websocket_endpoint("http://proxy.example/abc").unwrap().scheme(),
            "ws"
        );
        assert!(websocket_endpoint("ftp://proxy.example").is_err());
    }

    #[test]
    fn split_frame_keeps_valid_lines_only() {
        let payload = "{\"id\":1,\"result\":true}\n\nnot json\n{\"method\":\"mining.notify\"}\n{\"trunc";
        let values = split_frame(payload);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["id"], 1);
        assert_eq!(values[1]["method"], "mining.notify");
    }

    #[test]
    fn closed_connection_refuses_frames() {
        let (mut conn, mut rx) = Connection::channel("wss://x");
        assert_eq!(conn.state(), ConnectionState::Open);
        conn.send("{\"id\":1}").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "{\"id\":1}\n");

        conn.set_state(ConnectionState::Closed);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_open());
        assert!(matches!(conn.send("{}"), Err(MinerError::NotConnected)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_writer_counts_as_not_open() {
        let (conn, rx) = Connection::channel("wss://x");
        drop(rx);
        assert!(!conn.is_open());
        assert!(conn.send("{}").is_err());
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
