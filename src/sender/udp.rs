//! Fire-and-forget UDP delivery of one line-protocol payload.
//!
//! No response is expected and nothing is queued on failure; this path
//! exists for deployments that accept loss in exchange for never blocking
//! the polling loop.

use super::TransportError;
use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

pub async fn send_udp_line(host: &str, port: u16, line: &[u8]) -> Result<(), TransportError> {
    let Some(addr) = lookup_host((host, port))
        .await
        .map_err(|_| TransportError::Resolve {
            host: host.to_string(),
            port,
        })?
        .next()
    else {
        return Err(TransportError::Resolve {
            host: host.to_string(),
            port,
        });
    };

    let bind_addr = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    let sent = socket.send_to(line, addr).await?;
    if sent < line.len() {
        return Err(TransportError::ShortWrite {
            written: sent,
            expected: line.len(),
        });
    }
    debug!(bytes = sent, %addr, "datagram sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagram_reaches_a_local_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        send_udp_line("127.0.0.1", port, b"m v=1i 1\n").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"m v=1i 1\n");
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_resolve_error() {
        let err = send_udp_line("definitely-not-a-host.invalid", 8089, b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
    }
}
