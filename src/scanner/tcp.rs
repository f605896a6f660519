use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::network::Target;
use crate::scanner::results::PortResult;

/// One bounded-time connection attempt against a single port.
///
/// Implementations must not share mutable state between calls; the
/// coordinator runs many of them at once.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &Target, port: u16, timeout: Duration) -> PortResult;
}

/// Full TCP handshake via the OS `connect`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

#[async_trait]
impl Probe for TcpConnectProbe {
    async fn probe(&self, target: &Target, port: u16, timeout: Duration) -> PortResult {
        connect_probe(target.socket_addr(port), timeout).await
    }
}

pub async fn connect_probe(addr: SocketAddr, deadline: Duration) -> PortResult {
    let port = addr.port();
    let start = Instant::now();

    // The stream (or the pending connect future on timeout) is dropped
    // before returning, which closes the socket on every path.
    match timeout(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            PortResult::open(port, start.elapsed())
        }
        Ok(Err(e)) => classify_error(port, &e, start.elapsed()),
        Err(_) => PortResult::closed(port, start.elapsed()),
    }
}

/// Refusals, resets and OS-level timeouts all mean "not open"; anything
/// else is reported as a per-port error.
pub fn classify_error(port: u16, err: &io::Error, elapsed: Duration) -> PortResult {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::TimedOut => {
            PortResult::closed(port, elapsed)
        }
        _ => PortResult::error(port, err.to_string(), elapsed),
    }
}
