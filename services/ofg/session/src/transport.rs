//! TCP transport for backend connections.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::debug;

use crate::SessionError;

/// Bind a TCP listener (backend simulators and tests)
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Resolve `host` and connect to the first address that answers in time
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, SessionError> {
    let mut last_err = None;

    for addr in lookup_host((host, port)).await? {
        debug!("Connecting to {}", addr);
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(SessionError::Io(e)),
            Err(_) => last_err = Some(SessionError::ConnectTimeout),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}:{} did not resolve", host, port),
        ))
    }))
}
