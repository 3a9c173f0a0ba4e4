//! Readiness oracle for the emulator's listening socket.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tracing::debug;

/// Returns `true` when nothing is bound to `port` on the any-interface
/// address.
///
/// The probe binds the port itself and releases it immediately. Only
/// `AddrInUse` counts as "taken"; every other bind failure (permissions,
/// unsupported address family, ...) is reported as available because the
/// probe only answers whether something is already listening there.
pub async fn is_port_available(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(err) if err.kind() == ErrorKind::AddrInUse => false,
        Err(err) => {
            debug!(
                port,
                error = %err,
                "port probe bind failed; treating port as available"
            );
            true
        }
    }
}
