/// LED ON command byte sent to the TCP client.
pub const LED_ON_CMD: u8 = b'1';

/// LED OFF command byte sent to the TCP client.
pub const LED_OFF_CMD: u8 = b'0';

/// Acknowledgement the client sends back after switching its LED on.
pub const LED_ON_ACK: &[u8] = b"LED ON ACK";

/// Upper bound on a single acknowledgement read.
pub const MAX_RECV_BUFFER: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    pub fn toggled(self) -> LedState {
        match self {
            LedState::On => LedState::Off,
            LedState::Off => LedState::On,
        }
    }

    pub fn command_byte(self) -> u8 {
        match self {
            LedState::On => LED_ON_CMD,
            LedState::Off => LED_OFF_CMD,
        }
    }
}

/// Maps a client acknowledgement to the indicator state it confirms.
///
/// Only the exact byte sequence `LED ON ACK` counts as the on-acknowledgement;
/// everything else (including `LED OFF ACK`, an empty read, or garbage) is
/// treated as the off-acknowledgement.
pub fn parse_ack(payload: &[u8]) -> LedState {
    if payload == LED_ON_ACK {
        LedState::On
    } else {
        LedState::Off
    }
}
