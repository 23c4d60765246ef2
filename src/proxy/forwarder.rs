//! Data forwarding module
//!
//! This module relays bytes between the client and upstream streams of one tunnel.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::{BoxedIo, ProxyError, Result};

/// Relay buffer size per direction
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound on a best-effort close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Forward data between client and upstream until both directions finish
///
/// `buffered` client bytes are written upstream before anything else. A
/// direction reaching EOF half-closes its destination while the other
/// direction keeps running. The first error, or `token` firing, stops both.
/// `token` is cancelled and both streams are closed on every exit path.
///
/// # Returns
///
/// Returns `Ok(())` on a normal close, the first error otherwise.
pub async fn proxy_data(
    client: BoxedIo,
    upstream: BoxedIo,
    buffered: Bytes,
    token: &CancellationToken,
) -> Result<()> {
    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    let (mut upstream_reader, mut upstream_writer) = tokio::io::split(upstream);

    let outcome = {
        // Data flow from client to target, starting with the bytes read past the request head
        let client_to_target = async {
            if !buffered.is_empty() {
                upstream_writer.write_all(&buffered).await?;
            }
            let total = copy_half(&mut client_reader, &mut upstream_writer).await?;
            Ok::<_, io::Error>(total + buffered.len() as u64)
        };

        // Data flow from target to client
        let target_to_client = copy_half(&mut upstream_reader, &mut client_writer);

        // The first error drops the other direction mid-copy
        let both = async { tokio::try_join!(client_to_target, target_to_client) };

        tokio::select! {
            _ = token.cancelled() => Err(ProxyError::Cancelled),
            r = both => r
                .map(|(up, down)| {
                    debug!("Client to target transferred {} bytes total", up);
                    debug!("Target to client transferred {} bytes total", down);
                })
                .map_err(ProxyError::Io),
        }
    };

    token.cancel();

    try_close(client_reader.unsplit(client_writer)).await;
    try_close(upstream_reader.unsplit(upstream_writer)).await;

    outcome
}

/// Copy until EOF, then propagate the EOF by shutting down the writer
async fn copy_half<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buffer).await? {
            0 => break, // Connection closed
            n => {
                writer.write_all(&buffer[..n]).await?;
                writer.flush().await?;
                total += n as u64;
            }
        }
    }

    writer.shutdown().await?;
    Ok(total)
}

/// Best-effort close; failures and slow peers are ignored
pub async fn try_close(mut io: BoxedIo) {
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, io.shutdown()).await;
}
