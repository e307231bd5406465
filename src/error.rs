use std::io;

use thiserror::Error;

/// Transport-level read or write failure. Unrecoverable: the session that
/// observes it tears down.
#[derive(Debug, Error)]
#[error("connection failed: {source}")]
pub struct ConnectionError {
    #[from]
    source: io::Error,
}

impl ConnectionError {
    /// The outbound queue closed underneath the session, which means the
    /// writer half of the connection is gone.
    pub fn writer_gone() -> Self {
        io::Error::new(io::ErrorKind::BrokenPipe, "outbound writer closed").into()
    }
}

/// Malformed or out-of-sequence command. Reported to the sender as an
/// `[ERROR]` line; the session continues. The `Display` text is the exact
/// wire reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("[ERROR] Join a room first using /join <room_name>.")]
    NotInRoom,
    #[error("[ERROR] Usage: /join <room_name>")]
    MissingRoomName,
    #[error("[ERROR] Invalid file name.")]
    InvalidFileName,
}

/// Failure delivering to one recipient during fan-out. Logged and skipped;
/// never aborts delivery to the remaining recipients or affects the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayFailure {
    /// The recipient's outbound queue is full; the frame is dropped for
    /// that recipient only.
    #[error("recipient outbound queue is full")]
    Backlogged,
    /// The recipient's writer task has exited; the member is dead.
    #[error("recipient disconnected")]
    Disconnected,
}
