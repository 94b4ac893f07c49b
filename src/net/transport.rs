//! Newline-delimited message transport.
//!
//! Sends and receives exactly one frame over any async byte stream.
//! Both directions tolerate short writes/reads and race the shutdown
//! token, so a stalled peer can never pin the client.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::types::ClientError;

/// Frame terminator on the wire.
pub const DELIMITER: u8 = b'\n';

/// Bytes requested per read call; the frame buffer grows as needed.
const READ_CHUNK: usize = 1024;

/// Longest reply accepted before a delimiter must appear.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Write `frame` followed by the delimiter, in full.
///
/// Returns [`ClientError::Stopped`] if `cancel` fires first.
pub async fn send_frame<W>(
    writer: &mut W,
    frame: &str,
    cancel: &CancellationToken,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = Vec::with_capacity(frame.len() + 1);
    bytes.extend_from_slice(frame.as_bytes());
    bytes.push(DELIMITER);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Stopped),
        result = write_frame(writer, &bytes) => result.map_err(|source| ClientError::Transport {
            action: "send_message",
            source,
        }),
    }
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // write_all keeps writing the remainder after each short write.
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Read one frame and return it without its delimiter.
///
/// If the peer closes the stream before a delimiter arrives, whatever was
/// buffered is returned (possibly empty). A frame longer than
/// [`MAX_FRAME_LEN`] is a protocol violation. Returns
/// [`ClientError::Stopped`] if `cancel` fires first.
pub async fn receive_frame<R>(
    reader: &mut R,
    cancel: &CancellationToken,
) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Stopped),
        result = read_frame(reader) => result,
    }
}

async fn read_frame<R>(reader: &mut R) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|source| ClientError::Transport {
                action: "receive_message",
                source,
            })?;
        if n == 0 {
            break;
        }

        let scanned = buffer.len();
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer[scanned..].iter().position(|&b| b == DELIMITER) {
            // One frame per exchange: anything after the delimiter is dropped.
            buffer.truncate(scanned + pos);
            break;
        }
        if buffer.len() > MAX_FRAME_LEN {
            return Err(ClientError::ProtocolViolation(format!(
                "response exceeds {MAX_FRAME_LEN} bytes without a delimiter"
            )));
        }
    }

    String::from_utf8(buffer)
        .map_err(|e| ClientError::ProtocolViolation(format!("response is not valid UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
