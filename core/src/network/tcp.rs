use std::future::Future;
use std::time::Duration;

use dknw_common::error::{Error, Result};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Opens a TCP connection, classifying refusal and silence alike as unreachable.
pub async fn connect_within(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            // Frames are small and latency bound.
            if let Err(e) = stream.set_nodelay(true) {
                trace!("Could not set TCP_NODELAY on {host}:{port}: {e}");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::UnreachableHost(format!("{host}:{port}: {e}"))),
        Err(_elapsed) => Err(Error::UnreachableHost(format!(
            "{host}:{port}: no answer within {limit:?}"
        ))),
    }
}

/// Bounds an I/O future, naming what was awaited when it expires.
pub async fn within<T, F>(limit: Duration, what: &str, future: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_elapsed) => Err(Error::Timeout(what.to_string())),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
