//! Message loop driving a [`ServerSession`] over a byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::ProtocolResult;
use crate::session::{RequestHandler, ServerSession, SessionSummary};

/// Size of a single read from the input stream.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Serve requests until the input stream reaches end-of-file.
///
/// Writes `READY` first, then exactly one response line per request. The
/// output is flushed after every batch of responses so a client waiting on a
/// single request is never starved by buffering.
pub async fn serve<R, W, H>(
    mut reader: R,
    mut writer: W,
    mut session: ServerSession<H>,
) -> ProtocolResult<SessionSummary>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: RequestHandler,
{
    let ready = session.mark_ready()?;
    writer.write_all(ready.encode().as_bytes()).await?;
    writer.flush().await?;

    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            debug!("input stream closed");
            break;
        }

        let responses = session.feed(&chunk[..n])?;
        if responses.is_empty() {
            continue;
        }
        for response in &responses {
            writer.write_all(response.encode().as_bytes()).await?;
        }
        writer.flush().await?;
    }

    Ok(session.terminate())
}
