//! Network-join collaborator. The actual provisioning mechanism is a black
//! box behind [`Network`]; this module only drives it with bounded retries
//! and consumes the assigned IPv4 address.

use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// Maximum number of join attempts before giving up.
pub const MAX_JOIN_RETRIES: u32 = 10;

/// Fixed backoff between join attempts.
pub const JOIN_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("network join failed: {0}")]
    Failed(String),
}

/// Yields "joined, address assigned" or fails.
pub trait Network {
    fn join(&mut self) -> Result<Ipv4Addr, JoinError>;
}

/// A pre-assigned bind address, for hosts where no provisioning step exists.
pub struct StaticNetwork(pub Ipv4Addr);

impl Network for StaticNetwork {
    fn join(&mut self) -> Result<Ipv4Addr, JoinError> {
        Ok(self.0)
    }
}

/// Joins with up to `retries` attempts, `interval` apart. Exhaustion returns
/// the last error; join failure is fatal for the server.
pub async fn join_with_retry(
    net: &mut impl Network,
    retries: u32,
    interval: Duration,
) -> Result<Ipv4Addr, JoinError> {
    let mut last = None;
    for attempt in 1..=retries {
        match net.join() {
            Ok(addr) => {
                info!(address = %addr, "joined network, address assigned");
                return Ok(addr);
            }
            Err(err) => {
                warn!(attempt, retries, error = %err, "network join failed, retrying");
                last = Some(err);
                sleep(interval).await;
            }
        }
    }
    Err(last.unwrap_or_else(|| JoinError::Failed("no join attempts were made".into())))
}
