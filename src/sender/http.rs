//! Synchronous InfluxDB write transport.
//!
//! One write is one TCP exchange: connect, send the request line and body,
//! read back the response and parse nothing but its status line. Address
//! resolution is cached on the transport and redone only after a connect
//! failure, so a destination whose IP changes recovers on the next call
//! without paying a lookup on every send.

use super::{RECV_TIMEOUT, TransportError, is_success};
use crate::config::{Credentials, InfluxConfig};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, warn};

const RECV_BUF_LEN: usize = 1024;

#[derive(Debug)]
pub struct InfluxTransport {
    config: InfluxConfig,
    resolved: Option<Vec<SocketAddr>>,
}

impl InfluxTransport {
    pub fn new(config: InfluxConfig) -> Self {
        Self {
            config,
            resolved: None,
        }
    }

    /// Sends one finalized payload and returns the HTTP status code from
    /// the response status line.
    pub async fn send(&mut self, body: &[u8]) -> Result<u16, TransportError> {
        let addrs = self.addresses().await?;
        let header = self.request_header(body.len());

        let mut stream = None;
        for addr in &addrs {
            match timeout(RECV_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(s)) => {
                    stream = Some(s);
                    break;
                }
                Ok(Err(e)) => debug!(%addr, error = %e, "connect failed"),
                Err(_) => debug!(%addr, "connect timed out"),
            }
        }
        let Some(mut stream) = stream else {
            // The destination IP may have changed; resolve again next call.
            self.resolved = None;
            return Err(TransportError::Connect {
                host: self.config.host.clone(),
                port: self.config.port(),
            });
        };

        write_all_tracked(&mut stream, &[header.as_bytes(), body]).await?;
        stream.flush().await?;

        let mut buf = [0u8; RECV_BUF_LEN];
        let received = timeout(RECV_TIMEOUT, stream.read(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        if received == 0 {
            return Err(TransportError::MalformedResponse(
                "connection closed before a status line".into(),
            ));
        }

        let status = parse_status_line(&buf[..received])?;
        if is_success(status) {
            if status != 204 {
                debug!(status, "write accepted with non-204 status");
            }
        } else {
            warn!(status, "write rejected");
        }
        Ok(status)
    }

    async fn addresses(&mut self) -> Result<Vec<SocketAddr>, TransportError> {
        if let Some(addrs) = &self.resolved {
            return Ok(addrs.clone());
        }
        let host = self.config.host.clone();
        let port = self.config.port();
        let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), port))
            .await
            .map_err(|_| TransportError::Resolve {
                host: host.clone(),
                port,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve { host, port });
        }
        self.resolved = Some(addrs.clone());
        Ok(addrs)
    }

    /// Request line and headers, branching on the credential shape: v2
    /// authenticates with a token header, v1 with query-string credentials.
    pub(crate) fn request_header(&self, body_len: usize) -> String {
        let host = &self.config.host;
        match &self.config.credentials {
            Credentials::V2 { org, bucket, token } => {
                let path = self.config.api_path.as_deref().unwrap_or("/api/v2/write");
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("org", org)
                    .append_pair("bucket", bucket)
                    .finish();
                format!(
                    "POST {path}?{query} HTTP/1.1\r\nHost: {host}\r\nContent-Length: {body_len}\r\nAuthorization: Token {token}\r\n\r\n"
                )
            }
            Credentials::V1 {
                database,
                user,
                password,
            } => {
                let path = self.config.api_path.as_deref().unwrap_or("/write");
                let mut query = url::form_urlencoded::Serializer::new(String::new());
                query.append_pair("db", database);
                if let Some(user) = user {
                    query.append_pair("u", user);
                }
                if let Some(password) = password {
                    query.append_pair("p", password);
                }
                let query = query.finish();
                format!(
                    "POST {path}?{query} HTTP/1.1\r\nHost: {host}\r\nContent-Length: {body_len}\r\n\r\n"
                )
            }
        }
    }
}

/// Writes every part fully, reporting how far it got if the peer stops
/// accepting bytes.
async fn write_all_tracked(
    stream: &mut TcpStream,
    parts: &[&[u8]],
) -> Result<(), TransportError> {
    let expected: usize = parts.iter().map(|p| p.len()).sum();
    let mut written = 0;
    for part in parts {
        let mut offset = 0;
        while offset < part.len() {
            let n = stream.write(&part[offset..]).await?;
            if n == 0 {
                return Err(TransportError::ShortWrite { written, expected });
            }
            offset += n;
            written += n;
        }
    }
    Ok(())
}

/// Parses `HTTP/<ver> <code> <reason>` and nothing else. A response not
/// beginning with `HTTP/`, or with no status digits, is a transport error
/// distinct from a rejected status code.
pub(crate) fn parse_status_line(response: &[u8]) -> Result<u16, TransportError> {
    if !response.starts_with(b"HTTP/") {
        return Err(TransportError::MalformedResponse(
            "response does not start with HTTP/".into(),
        ));
    }
    let mut i = 5;
    while i < response.len() && response[i] != b' ' && response[i] != b'\n' {
        i += 1;
    }
    if i >= response.len() || response[i] != b' ' {
        return Err(TransportError::MalformedResponse(
            "no space before status code".into(),
        ));
    }
    i += 1;
    let start = i;
    let mut status: u32 = 0;
    while i < response.len() && response[i].is_ascii_digit() {
        status = status * 10 + u32::from(response[i] - b'0');
        if status > 999 {
            return Err(TransportError::MalformedResponse(
                "status code out of range".into(),
            ));
        }
        i += 1;
    }
    if i == start {
        return Err(TransportError::MalformedResponse(
            "status code missing".into(),
        ));
    }
    Ok(status as u16)
}
