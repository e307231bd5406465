use std::{net::SocketAddr, path::Path};

use anyhow::{Context, Result};
use tokio::{
    fs,
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{cli::ClientArgs, frame};

/// Something the relay delivered to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Chat text or a server notice, decoded lossily and trimmed.
    Text(String),
    /// A reassembled file relayed by another room member.
    File { name: String, bytes: Vec<u8> },
    /// The server closed the connection or the transport failed.
    Disconnected,
}

/// Command half of a client connection. The display name is composed into
/// outgoing chat text here; the server relays it opaquely.
pub struct ClientHandle {
    name: String,
    writer: OwnedWriteHalf,
}

/// Connects to the relay and splits the connection into a command handle
/// and an event stream fed by a background reader task.
pub async fn connect(
    addr: SocketAddr,
    name: &str,
) -> Result<(ClientHandle, mpsc::Receiver<ClientEvent>)> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    info!("connected to {addr}");

    let (reader, writer) = stream.into_split();
    let (events_tx, events_rx) = mpsc::channel(32);
    tokio::spawn(read_events(reader, events_tx));

    let handle = ClientHandle {
        name: name.to_string(),
        writer,
    };
    Ok((handle, events_rx))
}

impl ClientHandle {
    pub async fn join(&mut self, room: &str) -> Result<()> {
        frame::write_line(&mut self.writer, &format!("/join {room}")).await?;
        Ok(())
    }

    /// Sends chat text, prefixed with this client's display name.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let composed = format!("{}: {}", self.name, text);
        frame::write_text(&mut self.writer, &composed).await?;
        Ok(())
    }

    /// Uploads a file from disk and returns the name it was declared as.
    pub async fn send_file(&mut self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .and_then(|name| frame::sanitize_file_name(&name))
            .with_context(|| format!("{} has no usable file name", path.display()))?;

        frame::write_line(&mut self.writer, &format!("/sendfile {name}")).await?;
        self.writer.write_all(&bytes).await?;
        self.writer.write_all(frame::TERMINATOR).await?;
        self.writer.flush().await?;
        Ok(name)
    }

    pub async fn close(mut self) {
        if let Err(error) = self.writer.shutdown().await {
            warn!(?error, "failed to shutdown client writer cleanly");
        }
    }
}

/// Reader half of the client state machine: classifies inbound chunks as
/// text or `/file` frames and reassembles payloads until the terminator.
async fn read_events(mut reader: OwnedReadHalf, events: mpsc::Sender<ClientEvent>) {
    loop {
        let event = match frame::read_chunk(&mut reader).await {
            Ok(Some(chunk)) => match classify_chunk(&mut reader, chunk).await {
                Ok(event) => event,
                Err(err) => {
                    debug!(?err, "transport failed mid-frame");
                    break;
                }
            },
            Ok(None) => break,
            Err(err) => {
                debug!(?err, "transport read failed");
                break;
            }
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
    let _ = events.send(ClientEvent::Disconnected).await;
}

async fn classify_chunk(reader: &mut OwnedReadHalf, chunk: Vec<u8>) -> io::Result<ClientEvent> {
    let (head, rest) = frame::split_first_line(&chunk);
    let line = String::from_utf8_lossy(head);
    let line = line.trim();

    if let Some(raw_name) = line.strip_prefix("/file ") {
        let name = raw_name.trim().to_string();
        let bytes = frame::read_until_terminator(reader, rest.to_vec()).await?;
        return Ok(ClientEvent::File { name, bytes });
    }

    Ok(ClientEvent::Text(
        String::from_utf8_lossy(&chunk).trim().to_string(),
    ))
}

/// Terminal frontend: joins the configured room, then multiplexes stdin
/// with server events until the user quits or the server goes away.
pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut handle, mut events) = connect(args.server, &args.name).await?;
    handle.join(&args.room).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            event = events.recv() => {
                if !render_event(event, &args).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !handle_input(bytes_read, &input, &mut handle).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    handle.close().await;
    Ok(())
}

async fn render_event(event: Option<ClientEvent>, args: &ClientArgs) -> Result<bool> {
    match event {
        Some(ClientEvent::Text(text)) => {
            write_stdout(&text).await?;
            Ok(true)
        }
        Some(ClientEvent::File { name, bytes }) => {
            match save_file(&args.downloads, &name, &bytes).await {
                Ok(path) => write_stdout(&format!("[INFO] File saved: {path}")).await?,
                Err(err) => write_stderr(&format!("!!! could not save {name}: {err:#}")).await?,
            }
            Ok(true)
        }
        Some(ClientEvent::Disconnected) | None => {
            write_stdout("*** disconnected from server").await?;
            Ok(false)
        }
    }
}

/// Writes a received file into the downloads directory under a sanitized
/// name; the declared name is untrusted input.
async fn save_file(downloads: &Path, declared_name: &str, bytes: &[u8]) -> Result<String> {
    let name = frame::sanitize_file_name(declared_name)
        .with_context(|| format!("unusable file name {declared_name:?}"))?;
    fs::create_dir_all(downloads)
        .await
        .with_context(|| format!("failed to create {}", downloads.display()))?;
    let path = downloads.join(name);
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}

async fn handle_input(
    bytes_read: io::Result<usize>,
    input: &str,
    handle: &mut ClientHandle,
) -> Result<bool> {
    if bytes_read? == 0 {
        return Ok(false);
    }

    let text = input.trim();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    if let Some(room) = text.strip_prefix("/join ") {
        handle.join(room.trim()).await?;
        return Ok(true);
    }

    if let Some(path) = text.strip_prefix("/sendfile ") {
        match handle.send_file(Path::new(path.trim())).await {
            Ok(name) => write_stdout(&format!("[INFO] Sent file: {name}")).await?,
            Err(err) => write_stderr(&format!("!!! {err:#}")).await?,
        }
        return Ok(true);
    }

    handle.send_text(text).await?;
    write_stdout(&format!("{}: {}", handle.name, text)).await?;
    Ok(true)
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
