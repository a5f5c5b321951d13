//! Socket-level message I/O.

use bytes::BytesMut;
use ofg_wire::{Message, MessageDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

/// Read the next message from the socket
///
/// Already-buffered messages are returned before reading again, so this is
/// safe to race in `tokio::select!`: bytes read by a cancelled call stay in
/// `buffer` for the next one.
pub async fn recv_message<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    decoder: &mut MessageDecoder,
    buffer: &mut BytesMut,
) -> Result<Message, anyhow::Error> {
    loop {
        if let Some(msg) = decoder.decode(buffer)? {
            return Ok(msg);
        }

        let bytes_read = reader.read_buf(buffer).await?;
        if bytes_read == 0 {
            if buffer.is_empty() {
                anyhow::bail!("connection closed by peer");
            }
            anyhow::bail!("EOF while reading message ({} bytes pending)", buffer.len());
        }

        trace!(
            "Read {} bytes, buffer now has {} bytes",
            bytes_read,
            buffer.len()
        );
    }
}

/// Encode and write a single message
pub async fn send_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<usize, anyhow::Error> {
    let bytes = msg.encode()?;
    writer.write_all(&bytes).await?;
    Ok(bytes.len())
}
