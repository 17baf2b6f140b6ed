//! Connection lifecycle: accept handling, TCP keepalive configuration, and
//! the per-connection acknowledgement receive loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::{SetupError, is_peer_closed};
use crate::listener::RECV_TIMEOUT;
use crate::protocol::{self, MAX_RECV_BUFFER};
use crate::state::{Connection, ServerState};

/// Idle time on the connection before the first keepalive probe.
const KEEP_ALIVE_IDLE_TIME: Duration = Duration::from_millis(10_000);

/// Interval between keepalive probes.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1000);

/// Unanswered probes before the connection is considered dead.
const KEEP_ALIVE_RETRY_COUNT: u32 = 2;

/// Accept handler: configures keepalive on the fresh connection, then marks
/// it connected and starts its receive loop. A keepalive option failure
/// aborts the handler and the client is never marked connected.
pub async fn on_connect(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), SetupError> {
    configure_keepalive(&stream)?;

    let id = state.next_conn_id();
    let (read_half, writer) = stream.into_split();
    let reader = tokio::spawn(recv_loop(read_half, id, Arc::clone(&state)));

    state
        .client_connected(Connection {
            id,
            peer,
            writer,
            reader,
        })
        .await;
    Ok(())
}

fn configure_keepalive(stream: &TcpStream) -> Result<(), SetupError> {
    let sock = SockRef::from(stream);
    let params = TcpKeepalive::new()
        .with_time(KEEP_ALIVE_IDLE_TIME)
        .with_interval(KEEP_ALIVE_INTERVAL)
        .with_retries(KEEP_ALIVE_RETRY_COUNT);

    sock.set_tcp_keepalive(&params)
        .map_err(|source| SetupError::SocketOption {
            option: "TCP_KEEPALIVE",
            source,
        })?;
    sock.set_keepalive(true)
        .map_err(|source| SetupError::SocketOption {
            option: "SO_KEEPALIVE",
            source,
        })?;
    Ok(())
}

/// Waits for acknowledgements from the client and mirrors them into the
/// indicator state. Each read is bounded by [`RECV_TIMEOUT`] so the task can
/// never park forever on a half-open connection; a timeout just means no ack
/// yet. A peer-closed read tears the connection down proactively instead of
/// waiting for a separate disconnect event.
async fn recv_loop(mut reader: OwnedReadHalf, id: u64, state: Arc<ServerState>) {
    let mut buf = [0u8; MAX_RECV_BUFFER];
    loop {
        let read = match timeout(RECV_TIMEOUT, reader.read(&mut buf)).await {
            Ok(read) => read,
            Err(_) => continue, // no ack within the bound; keepalive covers dead peers
        };

        match read {
            Ok(0) => {
                info!("TCP client closed the connection");
                state.disconnect(id).await;
                break;
            }
            Ok(n) => {
                let payload = &buf[..n];
                info!(
                    ack = %String::from_utf8_lossy(payload),
                    "acknowledgement from TCP client"
                );
                state.set_indicator(protocol::parse_ack(payload));
            }
            Err(err) if is_peer_closed(&err) => {
                warn!(error = %err, "connection lost while waiting for acknowledgement");
                state.disconnect(id).await;
                break;
            }
            Err(err) => {
                // Transient: keep the connection and keep listening for acks.
                error!(error = %err, "failed to receive acknowledgement from TCP client");
            }
        }
    }
}
