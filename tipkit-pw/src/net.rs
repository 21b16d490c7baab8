//! Listener setup
//!
//! The worker is deployed as a pool of N sibling processes sharing one
//! port; `SO_REUSEPORT` lets the kernel spread incoming connections across
//! them. Within each process, the model gate keeps request servicing
//! sequential.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build a nonblocking TCP listener with `SO_REUSEPORT` (and
/// `SO_REUSEADDR`) set, ready for `axum::serve`.
pub fn reuseport_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    #[tokio::test]
    async fn two_processes_can_share_one_port() {
        let first = reuseport_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        // A second listener on the same port must succeed; this is what the
        // process pool relies on
        let second = reuseport_listener(addr).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), addr.port());
    }
}
