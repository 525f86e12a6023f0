//! Bidirectional byte splicing between two raw connections.
//!
//! # Data Flow
//! ```text
//!            spawned task: A ──copy──▶ B
//!   A ◀──▶                                  ◀──▶ B
//!            caller:       A ◀──copy── B
//! ```
//!
//! Whichever direction finishes first (EOF or error) flips the shared
//! `closed` flag, which stops the other copy. Each direction then shuts down
//! the stream it was writing to, so both streams are shut down exactly once.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Bytes moved in each direction by a finished transfer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Splice `a` and `b` together until either side closes.
///
/// `a → b` runs on a spawned task; `b → a` runs on the caller. Returns once
/// both directions have stopped and both streams are shut down.
pub async fn transfer<A, B>(a: A, b: B) -> TransferStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let closed = Arc::new(watch::channel(false).0);

    let forward = tokio::spawn(pipe(a_read, b_write, closed.clone()));
    let b_to_a = pipe(b_read, a_write, closed).await;

    let a_to_b = match forward.await {
        Ok(copied) => copied,
        Err(e) => {
            tracing::debug!(error = %e, "Transfer task failed");
            0
        }
    };

    TransferStats { a_to_b, b_to_a }
}

/// Copy `source` into `destination` until EOF, an error, or the pair closes.
async fn pipe<R, W>(mut source: R, mut destination: W, closed: Arc<watch::Sender<bool>>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut closed_rx = closed.subscribe();
    let mut copied = 0u64;

    let result = tokio::select! {
        res = copy_counted(&mut source, &mut destination, &mut copied) => res,
        _ = closed_rx.wait_for(|closed| *closed) => Ok(()),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, copied, "Transfer stopped on error");
    }

    closed.send_replace(true);
    let _ = destination.shutdown().await;
    copied
}

async fn copy_counted<R, W>(
    source: &mut R,
    destination: &mut W,
    copied: &mut u64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        destination.write_all(&buf[..n]).await?;
        destination.flush().await?;
        *copied += n as u64;
    }
}
