use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledlink::button::Button;
use ledlink::dispatch;
use ledlink::join::{self, JOIN_RETRY_INTERVAL, MAX_JOIN_RETRIES, StaticNetwork};
use ledlink::listener::{self, SERVER_PORT};
use ledlink::state::ServerState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("****************** TCP LED command server ******************");

    // Optional first argument: the IPv4 address to bind. The port is fixed.
    let bind_ip = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<Ipv4Addr>()?,
        None => Ipv4Addr::UNSPECIFIED,
    };

    let mut network = StaticNetwork(bind_ip);
    let assigned = join::join_with_retry(&mut network, MAX_JOIN_RETRIES, JOIN_RETRY_INTERVAL).await?;

    let listener = listener::setup(SocketAddrV4::new(assigned, SERVER_PORT))?;
    let port = listener.local_addr()?.port();

    let state = ServerState::new(port);
    let (button, commands) = Button::new(Arc::clone(&state));

    tokio::spawn(dispatch::run(Arc::clone(&state), Arc::clone(&button), commands));

    // Each line on stdin stands in for a press of the user button.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            button.press();
        }
    });

    listener::serve(listener, state).await;

    Ok(())
}
