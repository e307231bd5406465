use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Marks the end of a binary file payload in the absence of a length prefix.
pub const TERMINATOR: &[u8] = b"<EOF>";

/// Upper bound on a single transport read. One chunk is one inbound frame
/// for classification purposes; chat text carries no trailing delimiter.
pub const MAX_CHUNK: usize = 4096;

/// Reads one raw chunk from the transport. Returns `None` once the peer
/// has closed the connection.
pub async fn read_chunk<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_CHUNK];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(buf))
}

/// Accumulates chunks into `initial` until the buffer ends with the
/// terminator marker, then strips the marker and returns the payload.
/// EOF before the terminator is a connection error.
pub async fn read_until_terminator<R>(reader: &mut R, initial: Vec<u8>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = initial;
    while !payload.ends_with(TERMINATOR) {
        match read_chunk(reader).await? {
            Some(chunk) => payload.extend_from_slice(&chunk),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before payload terminator",
                ));
            }
        }
    }
    payload.truncate(payload.len() - TERMINATOR.len());
    Ok(payload)
}

/// Writes a newline-terminated control line and flushes so peers get
/// timely updates.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Writes relayed chat text verbatim, with no delimiter.
pub async fn write_text<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

/// Writes a complete file frame: the `/file <name>` announcement line,
/// the payload, then the terminator, as one ordered sequence.
pub async fn write_file_frame<W>(writer: &mut W, name: &str, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("/file {name}\n").as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.write_all(TERMINATOR).await?;
    writer.flush().await
}

/// Splits a chunk into its first line and the remaining bytes. A chunk
/// without a newline is a single bare line.
pub fn split_first_line(chunk: &[u8]) -> (&[u8], &[u8]) {
    match chunk.iter().position(|&b| b == b'\n') {
        Some(at) => (&chunk[..at], &chunk[at + 1..]),
        None => (chunk, &[]),
    }
}

/// Reduces an untrusted declared file name to a bare component safe to use
/// inside a dedicated directory: path separators and traversal sequences
/// are neutralized by keeping only the final non-empty segment.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let candidate = raw.trim().rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = candidate.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_file_name("pic.png"), Some("pic.png".to_string()));
        assert_eq!(sanitize_file_name("  notes.txt "), Some("notes.txt".to_string()));
    }

    #[test]
    fn sanitize_neutralizes_traversal() {
        assert_eq!(
            sanitize_file_name("../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(
            sanitize_file_name("..\\..\\boot.ini"),
            Some("boot.ini".to_string())
        );
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("uploads/"), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn split_first_line_handles_missing_newline() {
        assert_eq!(split_first_line(b"just text"), (&b"just text"[..], &b""[..]));
        let (head, rest) = split_first_line(b"/sendfile a.bin\npayload");
        assert_eq!(head, b"/sendfile a.bin");
        assert_eq!(rest, b"payload");
    }

    #[tokio::test]
    async fn payload_roundtrip_across_split_chunks() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let payload: Vec<u8> = (0..200u16).map(|n| (n % 251) as u8).collect();

        let body = payload.clone();
        let writer = tokio::spawn(async move {
            tx.write_all(&body).await.unwrap();
            tx.write_all(TERMINATOR).await.unwrap();
        });

        let got = read_until_terminator(&mut rx, Vec::new()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn payload_preserves_interior_terminator_bytes() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        let mut payload = b"before".to_vec();
        payload.extend_from_slice(TERMINATOR);
        payload.extend_from_slice(b"after");

        let mut framed = payload.clone();
        framed.extend_from_slice(TERMINATOR);
        tx.write_all(&framed).await.unwrap();

        let got = read_until_terminator(&mut rx, Vec::new()).await.unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn file_frame_announces_then_streams() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        write_file_frame(&mut tx, "pic.png", b"binary-bytes")
            .await
            .unwrap();
        drop(tx);

        let mut received = Vec::new();
        while let Some(chunk) = read_chunk(&mut rx).await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"/file pic.png\nbinary-bytes<EOF>");
    }
}
