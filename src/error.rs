use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failures while building the listening socket. All of these are fatal:
/// they mean the server can never function, so the process reports and exits
/// instead of retrying with a half-built socket.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to create server socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind server socket to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on server socket: {0}")]
    Listen(#[source] io::Error),
}

/// True when an I/O error means the peer went away, as opposed to a
/// transient failure worth leaving the connection up for.
pub fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_closed_classification() {
        assert!(is_peer_closed(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_peer_closed(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_peer_closed(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_peer_closed(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[test]
    fn socket_option_error_names_the_option() {
        let err = SetupError::SocketOption {
            option: "SO_RCVTIMEO",
            source: io::Error::from(io::ErrorKind::InvalidInput),
        };
        assert!(err.to_string().contains("SO_RCVTIMEO"));
    }
}
