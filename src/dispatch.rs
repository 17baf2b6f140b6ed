//! Command dispatch loop: the one task allowed to block on the pending
//! command, the debounce delay, and the send.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::button::Button;
use crate::state::ServerState;

/// Debounce period of the user button.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(50);

/// Runs until the command channel closes. Each cycle: wait indefinitely for
/// a pending command (presses are user-triggered, not time-sensitive), hold
/// off for the debounce period, re-sample the trigger, and send the command
/// byte if a client is connected. The button is re-armed at the end of every
/// cycle regardless of outcome.
pub async fn run(state: Arc<ServerState>, button: Arc<Button>, mut commands: mpsc::Receiver<u8>) {
    while let Some(cmd) = commands.recv().await {
        sleep(DEBOUNCE_DELAY).await;

        if button.is_held() {
            state.send_command(cmd).await;
        } else {
            debug!("trigger released during debounce, press ignored");
        }

        button.rearm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LedState;
    use crate::state::Connection;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    async fn attach_client(state: &Arc<ServerState>) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let peer = server.peer_addr().unwrap();
        let id = state.next_conn_id();
        let (_read, writer) = server.into_split();
        state
            .client_connected(Connection {
                id,
                peer,
                writer,
                reader: tokio::spawn(async {}),
            })
            .await;
        client
    }

    #[tokio::test]
    async fn press_without_client_is_discarded_and_button_rearmed() {
        let state = ServerState::new(50007);
        state.start_listening().await;
        let (button, commands) = Button::new(Arc::clone(&state));

        let loop_task = tokio::spawn(run(
            Arc::clone(&state),
            Arc::clone(&button),
            commands,
        ));

        state.set_indicator(LedState::On);
        button.press();

        // Give the loop a full debounce cycle.
        sleep(Duration::from_millis(200)).await;

        // No client: no error, no state change, and the button is armed again.
        assert!(!state.is_connected().await);
        assert_eq!(state.indicator(), LedState::On);
        assert!(!button.is_held());

        loop_task.abort();
    }

    #[tokio::test]
    async fn press_released_during_debounce_is_rejected() {
        let state = ServerState::new(50007);
        state.start_listening().await;
        let (button, commands) = Button::new(Arc::clone(&state));
        let mut client = attach_client(&state).await;

        let loop_task = tokio::spawn(run(
            Arc::clone(&state),
            Arc::clone(&button),
            commands,
        ));

        // The level drops again before the debounce re-sample: a glitch.
        button.press();
        button.release();

        sleep(Duration::from_millis(200)).await;
        let mut byte = [0u8; 1];
        let read = timeout(Duration::from_millis(200), client.read(&mut byte)).await;
        assert!(read.is_err(), "glitch press must not reach the client");
        assert!(!button.is_held());

        // A press that stays held still goes through.
        button.press();
        timeout(Duration::from_secs(2), client.read_exact(&mut byte))
            .await
            .expect("no command within 2s")
            .expect("read failed");
        assert_eq!(byte[0], b'1');

        loop_task.abort();
    }
}
