use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tracing::{debug, info};

use crate::{
    error::{ConnectionError, ProtocolError},
    frame,
    registry::{MemberHandle, MemberId, RoomRegistry},
    relay::{self, Outbound},
};

/// How many frames a member's outbound queue buffers before fan-out starts
/// dropping frames for that member.
pub const OUTBOX_CAPACITY: usize = 64;

/// Protocol phase of one connection. The transient file-receiving stretch
/// lives inside the upload handler while the payload is being consumed;
/// the terminal closed state is the return from [`Session::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unjoined,
    Joined { room: String },
}

/// Server-side state machine for one connection. Reads raw chunks from its
/// own half of the socket, classifies them, and hands relayable content to
/// the dispatcher. Replies to the peer go through the same outbound queue
/// as relayed frames so per-recipient ordering holds.
pub struct Session<R> {
    id: MemberId,
    registry: Arc<RoomRegistry>,
    reader: R,
    outbox: mpsc::Sender<Outbound>,
    phase: SessionPhase,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        id: MemberId,
        registry: Arc<RoomRegistry>,
        reader: R,
        outbox: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            id,
            registry,
            reader,
            outbox,
            phase: SessionPhase::Unjoined,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Drives the session until the peer disconnects or the transport
    /// fails. Room membership cleanup is the caller's responsibility so it
    /// runs exactly once even if this future is dropped or panics.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        while let Some(chunk) = frame::read_chunk(&mut self.reader).await? {
            self.handle_chunk(chunk).await?;
        }
        Ok(())
    }

    /// Classifies one transport chunk. A `/join` consumes only its own
    /// line; anything following it in the same chunk (a command or chat
    /// text the peer wrote back-to-back) is processed in turn.
    async fn handle_chunk(&mut self, mut chunk: Vec<u8>) -> Result<(), ConnectionError> {
        loop {
            let (head, rest) = frame::split_first_line(&chunk);
            let line = String::from_utf8_lossy(head);
            let line = line.trim();

            if let Some(room) = command_arg(line, "/join") {
                let remainder = rest.to_vec();
                self.handle_join(room).await?;
                if remainder.is_empty() {
                    return Ok(());
                }
                chunk = remainder;
                continue;
            }

            let SessionPhase::Joined { room } = self.phase.clone() else {
                return self.reject(ProtocolError::NotInRoom).await;
            };

            if let Some(name) = command_arg(line, "/sendfile") {
                return self.handle_sendfile(&room, name, rest.to_vec()).await;
            }

            let text = String::from_utf8_lossy(&chunk).trim().to_string();
            if !text.is_empty() {
                debug!(room = %room, member = self.id, "relaying chat text");
                relay::relay_text(&self.registry, &room, self.id, text).await;
            }
            return Ok(());
        }
    }

    async fn handle_join(&mut self, room: &str) -> Result<(), ConnectionError> {
        if room.is_empty() {
            return self.reject(ProtocolError::MissingRoomName).await;
        }

        let member = MemberHandle::new(self.id, self.outbox.clone());
        self.registry.join(room, member).await;
        self.phase = SessionPhase::Joined {
            room: room.to_string(),
        };
        info!(member = self.id, room, "member joined room");
        self.reply(format!("[INFO] Joined room: {room}")).await
    }

    /// Consumes one upload, then hands the completed payload to the
    /// dispatcher. `initial` covers payload bytes that arrived in the same
    /// chunk as the command line.
    async fn handle_sendfile(
        &mut self,
        room: &str,
        declared_name: &str,
        initial: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        let Some(name) = frame::sanitize_file_name(declared_name) else {
            return self.reject(ProtocolError::InvalidFileName).await;
        };

        self.reply(format!("[INFO] Ready to receive file: {name}"))
            .await?;
        let payload = frame::read_until_terminator(&mut self.reader, initial).await?;
        self.reply("[INFO] File uploaded successfully.".to_string())
            .await?;

        info!(
            member = self.id,
            room,
            file = %name,
            bytes = payload.len(),
            "fanning out uploaded file"
        );
        relay::relay_file(&self.registry, room, self.id, name, payload).await;
        Ok(())
    }

    async fn reject(&mut self, error: ProtocolError) -> Result<(), ConnectionError> {
        debug!(member = self.id, %error, "rejecting command");
        self.reply(error.to_string()).await
    }

    async fn reply(&mut self, line: String) -> Result<(), ConnectionError> {
        self.outbox
            .send(Outbound::Line(line))
            .await
            .map_err(|_| ConnectionError::writer_gone())
    }
}

/// Extracts the argument of a slash command, or `None` when the line is
/// not that command. `/joinx` is not `/join`.
fn command_arg<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(' ') {
        Some(rest.trim())
    } else {
        None
    }
}

/// Drains one member's outbound queue onto its write half. Runs until the
/// queue closes or a write fails; either way the socket is released.
pub async fn write_outbound<W>(
    mut writer: W,
    mut frames: mpsc::Receiver<Outbound>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = frames.recv().await {
        match outbound {
            Outbound::Line(line) => frame::write_line(&mut writer, &line).await?,
            Outbound::Text(text) => frame::write_text(&mut writer, &text).await?,
            Outbound::File { name, payload } => {
                frame::write_file_frame(&mut writer, &name, &payload).await?
            }
        }
    }
    Ok(())
}
