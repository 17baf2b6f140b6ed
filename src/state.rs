//! Shared server state: the single client connection slot, the lifecycle
//! phase machine, and the LED indicator. Every transition goes through a
//! method here so illegal orderings are logged instead of silently trusted.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::is_peer_closed;
use crate::protocol::{LED_ON_CMD, LedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Connected,
}

/// The live client connection. The write half is owned here so the dispatch
/// loop can send; the read half lives inside the spawned reader task.
pub struct Connection {
    pub id: u64,
    pub peer: SocketAddr,
    pub writer: OwnedWriteHalf,
    pub reader: JoinHandle<()>,
}

struct Link {
    phase: Phase,
    conn: Option<Connection>,
}

pub struct ServerState {
    link: Mutex<Link>,
    // Read by the button press path, which must stay wait-free.
    indicator: AtomicBool,
    next_id: AtomicU64,
    port: u16,
}

impl ServerState {
    pub fn new(port: u16) -> Arc<Self> {
        Arc::new(Self {
            link: Mutex::new(Link {
                phase: Phase::Idle,
                conn: None,
            }),
            indicator: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            port,
        })
    }

    pub fn indicator(&self) -> LedState {
        if self.indicator.load(Ordering::Relaxed) {
            LedState::On
        } else {
            LedState::Off
        }
    }

    pub fn set_indicator(&self, led: LedState) {
        self.indicator.store(led == LedState::On, Ordering::Relaxed);
    }

    /// Hands out connection ids. A teardown request carries the id of the
    /// connection it saw, so a stale request cannot kill a replacement.
    pub fn next_conn_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn phase(&self) -> Phase {
        self.link.lock().await.phase
    }

    pub async fn is_connected(&self) -> bool {
        let link = self.link.lock().await;
        debug_assert_eq!(link.phase == Phase::Connected, link.conn.is_some());
        link.conn.is_some()
    }

    /// Idle -> Listening. Called once, when the listening socket is up.
    pub async fn start_listening(&self) {
        let mut link = self.link.lock().await;
        match link.phase {
            Phase::Idle => {
                link.phase = Phase::Listening;
                self.announce_listening();
            }
            Phase::Listening => self.announce_listening(),
            Phase::Connected => {
                warn!("listen transition ignored while a client is connected");
            }
        }
    }

    /// Diagnostic re-announce after a failed accept; no transition.
    pub fn announce_listening(&self) {
        info!(port = self.port, "listening for incoming TCP client connection");
    }

    /// Listening -> Connected. A client arriving while another is connected
    /// replaces it; the old reader task is aborted and its writer dropped.
    pub async fn client_connected(&self, conn: Connection) {
        let mut link = self.link.lock().await;
        if link.phase == Phase::Idle {
            warn!("client accepted before the server started listening");
        }
        if let Some(old) = link.conn.take() {
            warn!(
                old_peer = %old.peer,
                new_peer = %conn.peer,
                "replacing existing client connection"
            );
            old.reader.abort();
        }
        info!(peer = %conn.peer, "incoming TCP connection accepted");
        info!("press the user button to send LED ON/OFF command to the TCP client");
        link.phase = Phase::Connected;
        link.conn = Some(conn);
    }

    /// Connected -> Listening for the connection identified by `id`.
    ///
    /// Idempotent: the receive loop, the send-failure path, and an explicit
    /// disconnect may all request teardown for the same peer; only the first
    /// one with a matching id does anything.
    pub async fn disconnect(&self, id: u64) {
        let mut link = self.link.lock().await;
        self.teardown_locked(&mut link, id);
    }

    /// Sends one command byte to the connected client, if any. With no client
    /// connected the command is discarded silently; not-connected is a normal
    /// state. The write is non-blocking (`try_write`), so the critical
    /// section never awaits and a stalled socket cannot hold up accepts or
    /// disconnects; a not-ready socket counts as a transient failure. A
    /// peer-closed send failure tears the connection down without waiting
    /// for a disconnect event.
    pub async fn send_command(&self, cmd: u8) {
        let mut link = self.link.lock().await;

        let (result, id) = match link.conn.as_mut() {
            Some(conn) => (conn.writer.try_write(&[cmd]), conn.id),
            None => {
                debug!("no TCP client connected, command dropped");
                return;
            }
        };

        match result {
            Ok(_) => {
                if cmd == LED_ON_CMD {
                    info!("LED ON command sent to TCP client");
                } else {
                    info!("LED OFF command sent to TCP client");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                // Socket buffer full: transient, the connection is kept and
                // the next button press is the retry.
                warn!("socket not ready, command not sent");
            }
            Err(err) => {
                error!(error = %err, "failed to send command to TCP client");
                if is_peer_closed(&err) {
                    self.teardown_locked(&mut link, id);
                }
                // Any other send failure leaves the connection as-is.
            }
        }
    }

    fn teardown_locked(&self, link: &mut Link, id: u64) {
        if !link.conn.as_ref().is_some_and(|c| c.id == id) {
            // Stale id: that connection is already gone or was replaced.
            return;
        }
        if let Some(conn) = link.conn.take() {
            conn.reader.abort();
            info!(peer = %conn.peer, "TCP client disconnected");
        }
        link.phase = Phase::Listening;
        self.indicator.store(false, Ordering::Relaxed);
        self.announce_listening();
    }
}
