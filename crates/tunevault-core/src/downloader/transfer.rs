//! Streaming transfer with striped decryption.
//!
//! The source stream is cut into fixed windows. Only full windows whose index
//! is a multiple of the stripe period are encrypted; everything else is
//! plaintext and copied through untouched. The engine never deletes the
//! destination: on error the caller removes the partial file.

use crate::cancel::CancellationToken;
use crate::cipher;
use crate::config::TransferConfig;
use crate::error::{Result, VaultError};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Fill `window` from `source`, accumulating short reads.
///
/// Returns fewer bytes than the window only at end of stream.
async fn fill_window<R>(
    source: &mut R,
    window: &mut [u8],
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < window.len() {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Err(VaultError::Cancelled),
            read = source.read(&mut window[filled..]) => read,
        };
        let n = read.map_err(|e| VaultError::Transfer {
            path: dest.to_path_buf(),
            message: format!("read failed: {}", e),
        })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Decrypt `source` into a new file at `dest`.
///
/// Returns the number of bytes written.
pub async fn stream_to_file<R>(
    source: &mut R,
    dest: &Path,
    key: &[u8],
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut file = File::create(dest)
        .await
        .map_err(|e| VaultError::io_with_path(e, dest))?;

    let mut window = vec![0u8; TransferConfig::WINDOW_SIZE];
    let mut written: u64 = 0;

    for index in 0usize.. {
        cancel.check()?;

        let filled = fill_window(source, &mut window, dest, cancel).await?;
        if filled == 0 {
            break;
        }

        let chunk = &mut window[..filled];
        if index % TransferConfig::STRIPE_PERIOD == 0 && filled == TransferConfig::WINDOW_SIZE {
            cipher::decrypt(chunk, key)?;
        }

        file.write_all(chunk)
            .await
            .map_err(|e| VaultError::io_with_path(e, dest))?;
        written += filled as u64;

        if filled < TransferConfig::WINDOW_SIZE {
            break;
        }
    }

    file.flush()
        .await
        .map_err(|e| VaultError::io_with_path(e, dest))?;

    debug!("Wrote {} bytes to {}", written, dest.display());
    Ok(written)
}
