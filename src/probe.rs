//! TCP reachability checks against host ports.
//!
//! Used twice: before `init` to make sure the forwarded ports are free, and
//! after power-on to detect that the guest's SSH forward accepts connections.

use std::time::Duration;

use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait PortProbe {
    /// Whether something on localhost accepts TCP connections on `port`.
    async fn is_listening(&self, port: u16) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    async fn is_listening(&self, port: u16) -> bool {
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
            Ok(Ok(_))
        )
    }
}
