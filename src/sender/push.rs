//! Dashboard live-push transport.
//!
//! Live dashboards take the same line-protocol records over a persistent
//! WebSocket, or over plain HTTP POST when the upgrade is not available.
//! The very first connection attempt of a transport's lifetime decides
//! which: if the WebSocket handshake fails then, the scheme is downgraded
//! (`wss` to `https`, otherwise to `http`) and the transport stays on
//! plain HTTP until reconfigured. Handshake failures on later attempts
//! are transient; the caller's queueing handles them.

use super::{RECV_TIMEOUT, TransportError};
use crate::config::PushConfig;
use futures::{FutureExt, SinkExt, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-transport connection lifecycle.
enum Connection {
    /// No attempt ever made. The WebSocket upgrade is still on the table,
    /// and a handshake failure here downgrades permanently.
    Untried,
    Open(Box<WsStream>),
    /// Torn down after a failure on an established connection. The next
    /// call re-negotiates a WebSocket from scratch; no further downgrade.
    Closed,
    /// Downgraded on the first attempt; WebSocket stays off until the
    /// client is reconfigured.
    HttpOnly,
}

pub struct PushTransport {
    config: PushConfig,
    connection: Connection,
    http: Option<reqwest::Client>,
}

impl PushTransport {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            connection: Connection::Untried,
            http: None,
        }
    }

    /// Whether the one-time downgrade to plain HTTP has happened.
    pub fn is_downgraded(&self) -> bool {
        matches!(self.connection, Connection::HttpOnly)
    }

    /// Sends one payload, negotiating the channel as needed. An empty
    /// payload is exclusively a keep-alive opportunity: it may establish
    /// or service the connection but never posts data.
    pub async fn send(&mut self, payload: &[u8]) -> Result<u16, TransportError> {
        match &mut self.connection {
            Connection::Open(_) => self.send_ws(payload).await,
            Connection::HttpOnly => {
                if payload.is_empty() {
                    return Ok(200);
                }
                self.send_http(payload).await
            }
            Connection::Untried => match self.connect_ws().await {
                Ok(ws) => {
                    info!(url = %self.ws_url(), "websocket push channel established");
                    self.connection = Connection::Open(Box::new(ws));
                    self.send_ws(payload).await
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        fallback = %self.http_url(),
                        "websocket handshake failed on first attempt, downgrading to plain HTTP"
                    );
                    self.connection = Connection::HttpOnly;
                    if payload.is_empty() {
                        return Ok(200);
                    }
                    self.send_http(payload).await
                }
            },
            Connection::Closed => {
                let ws = self.connect_ws().await?;
                debug!("websocket push channel re-established");
                self.connection = Connection::Open(Box::new(ws));
                self.send_ws(payload).await
            }
        }
    }

    /// Closes an open WebSocket cleanly. Does not undo a downgrade.
    pub async fn close(&mut self) {
        if let Connection::Open(ws) = &mut self.connection {
            if let Err(e) = ws.as_mut().close(None).await {
                debug!(error = %e, "websocket close failed");
            }
            self.connection = Connection::Closed;
        }
    }

    async fn send_ws(&mut self, payload: &[u8]) -> Result<u16, TransportError> {
        let result = match &mut self.connection {
            Connection::Open(ws) => exchange(ws, payload).await,
            _ => Err(TransportError::WebSocket("no open connection".into())),
        };
        if result.is_err() {
            // A send failure on an established connection is fatal for it:
            // tear down so the next call re-negotiates from scratch.
            self.connection = Connection::Closed;
        }
        result
    }

    async fn connect_ws(&self) -> Result<WsStream, TransportError> {
        let url = self.ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let bearer = format!("Bearer {}", self.config.token);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| TransportError::WebSocket(e.to_string()))?,
        );

        let connector = (!self.config.verify_tls).then(insecure_connector);
        let (ws, response) = timeout(
            RECV_TIMEOUT,
            connect_async_tls_with_config(request, None, false, connector),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        debug!(status = response.status().as_u16(), url = %url, "websocket upgrade accepted");
        Ok(ws)
    }

    async fn send_http(&mut self, payload: &[u8]) -> Result<u16, TransportError> {
        let client = self.http_client()?;
        let response = client
            .post(self.http_url())
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(payload.to_vec())
            .timeout(RECV_TIMEOUT)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    fn http_client(&mut self) -> Result<reqwest::Client, TransportError> {
        if let Some(client) = &self.http {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(RECV_TIMEOUT)
            .danger_accept_invalid_certs(!self.config.verify_tls)
            .build()?;
        self.http = Some(client.clone());
        Ok(client)
    }

    fn ws_url(&self) -> String {
        self.push_url(ws_scheme(&self.config.host))
    }

    fn http_url(&self) -> String {
        self.push_url(http_scheme(&self.config.host))
    }

    fn push_url(&self, scheme: &str) -> String {
        format!(
            "{scheme}://{}:{}/api/live/push/{}",
            bare_host(&self.config.host),
            self.config.port,
            self.config.push_id
        )
    }
}

/// Drains pending frames without blocking, then sends the payload as one
/// text frame. An empty payload only services keep-alives.
async fn exchange(ws: &mut WsStream, payload: &[u8]) -> Result<u16, TransportError> {
    loop {
        match ws.next().now_or_never() {
            None => break,
            Some(None) => {
                return Err(TransportError::WebSocket(
                    "server closed the connection".into(),
                ));
            }
            Some(Some(Ok(Message::Ping(_)))) => debug!("absorbed keep-alive ping"),
            Some(Some(Ok(Message::Close(_)))) => {
                return Err(TransportError::WebSocket(
                    "server closed the connection".into(),
                ));
            }
            Some(Some(Ok(_))) => {}
            Some(Some(Err(e))) => return Err(TransportError::WebSocket(e.to_string())),
        }
    }

    if payload.is_empty() {
        // Flush any pong queued by the ping absorption above.
        ws.flush()
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        return Ok(200);
    }

    let text = String::from_utf8_lossy(payload).into_owned();
    ws.send(Message::text(text))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok(200)
}

/// Host string without its scheme prefix.
fn bare_host(host: &str) -> &str {
    host.split_once("://").map_or(host, |(_, rest)| rest)
}

/// Scheme for the WebSocket upgrade attempt. Secure variants stay secure.
fn ws_scheme(host: &str) -> &'static str {
    match host.split_once("://").map(|(scheme, _)| scheme) {
        Some("wss") | Some("https") => "wss",
        _ => "ws",
    }
}

/// Scheme for the plain-HTTP path, also the downgrade target.
fn http_scheme(host: &str) -> &'static str {
    match host.split_once("://").map(|(scheme, _)| scheme) {
        Some("wss") | Some("https") => "https",
        _ => "http",
    }
}

fn insecure_connector() -> Connector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification))
        .with_no_client_auth();
    Connector::Rustls(Arc::new(config))
}

/// Certificate verifier for destinations with peer verification turned
/// off in the configuration (self-signed dashboard installs).
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
