//! Listening socket manager: builds the server socket step by step (create,
//! configure, bind, listen) with a distinct error per step, then runs the
//! accept loop.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::conn;
use crate::error::SetupError;
use crate::state::ServerState;

/// Fixed TCP port the server listens on.
pub const SERVER_PORT: u16 = 50007;

/// Pending connections queued by the listening socket.
const MAX_PENDING_CONNECTIONS: i32 = 3;

/// Bound on a single blocking receive. Under the async runtime this is
/// enforced per-read in the receive loop; it is also set as `SO_RCVTIMEO`
/// during configuration to honor the setup contract.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);

pub fn create() -> Result<Socket, SetupError> {
    Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(SetupError::SocketCreate)
}

pub fn configure(socket: &Socket, recv_timeout: Duration) -> Result<(), SetupError> {
    socket
        .set_read_timeout(Some(recv_timeout))
        .map_err(|source| SetupError::SocketOption {
            option: "SO_RCVTIMEO",
            source,
        })?;
    socket
        .set_reuse_address(true)
        .map_err(|source| SetupError::SocketOption {
            option: "SO_REUSEADDR",
            source,
        })?;
    Ok(())
}

pub fn bind(socket: &Socket, addr: SocketAddrV4) -> Result<(), SetupError> {
    socket
        .bind(&SocketAddr::V4(addr).into())
        .map_err(|source| SetupError::Bind {
            addr: SocketAddr::V4(addr),
            source,
        })
}

pub fn listen(socket: Socket) -> Result<TcpListener, SetupError> {
    socket
        .listen(MAX_PENDING_CONNECTIONS)
        .map_err(SetupError::Listen)?;
    socket
        .set_nonblocking(true)
        .map_err(|source| SetupError::SocketOption {
            option: "O_NONBLOCK",
            source,
        })?;
    TcpListener::from_std(socket.into()).map_err(SetupError::Listen)
}

/// Runs the full setup sequence. Any failure here is fatal; the caller
/// should report it and exit rather than continue with a half-built server.
pub fn setup(addr: SocketAddrV4) -> Result<TcpListener, SetupError> {
    let socket = create()?;
    configure(&socket, RECV_TIMEOUT)?;
    bind(&socket, addr)?;
    let listener = listen(socket)?;
    info!(port = listener.local_addr().map(|a| a.port()).unwrap_or(addr.port()),
          "TCP server socket ready");
    Ok(listener)
}

/// Accept loop. Accept and keepalive-configuration failures are transient:
/// they are logged and the server re-announces that it is listening.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) {
    state.start_listening().await;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(err) = conn::on_connect(Arc::clone(&state), stream, peer).await {
                    error!(%peer, error = %err, "failed to accept incoming client connection");
                    state.announce_listening();
                }
            }
            Err(err) => {
                error!(error = %err, "failed to accept incoming client connection");
                state.announce_listening();
            }
        }
    }
}
