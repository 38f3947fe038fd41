//! Single-address download and upload. Each call owns exactly one session and
//! closes it whether the operation succeeded or not.

use std::path::{Path, PathBuf};

use dknw_common::error::{Error, Result, TransferFailure};
use dknw_common::model::Address;
use dknw_common::success;
use tracing::{debug, info, warn};

use crate::transport::{ClientFactory, TransportClient};

/// Fetches `address` and writes it to `dest`. Returns the bytes written.
///
/// An existing directory as `dest` receives a file named `<directory>.<file>`.
pub async fn download(factory: &dyn ClientFactory, address: Address, dest: &Path) -> Result<u64> {
    let target: PathBuf = resolve_destination(address, dest).await;

    let mut client: Box<dyn TransportClient> = factory.create();
    let fetched: Result<Vec<u8>> = async {
        client.connect().await?;
        client.get(address).await
    }
    .await;
    release(client.as_mut()).await;

    let payload: Vec<u8> = fetched?;
    write_atomically(&target, &payload).await?;

    success!("Downloaded {address} to {} ({} bytes)", target.display(), payload.len());
    Ok(payload.len() as u64)
}

/// Stores the file at `src` under `address`. Returns the byte count the terminal confirmed.
pub async fn upload(factory: &dyn ClientFactory, src: &Path, address: Address) -> Result<u64> {
    let payload: Vec<u8> = tokio::fs::read(src).await?;
    let expected: u64 = payload.len() as u64;
    info!("Uploading {} ({expected} bytes) to {address}", src.display());

    let mut client: Box<dyn TransportClient> = factory.create();
    let stored: Result<u64> = async {
        client.connect().await?;
        client.put(address, &payload).await
    }
    .await;
    release(client.as_mut()).await;

    let accepted: u64 = stored?;
    if accepted != expected {
        return Err(Error::Transfer(TransferFailure::LengthMismatch {
            expected,
            actual: accepted,
        }));
    }

    success!("Terminal accepted {accepted} bytes at {address}");
    Ok(accepted)
}

/// `dest/<directory>.<file>` when `dest` is an existing directory, `dest` otherwise.
pub async fn resolve_destination(address: Address, dest: &Path) -> PathBuf {
    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_dir() => dest.join(address.file_name()),
        _ => dest.to_path_buf(),
    }
}

/// Writes through a hidden `.part` sibling and renames, so readers never see a partial file.
pub async fn write_atomically(path: &Path, payload: &[u8]) -> Result<()> {
    let name: &str = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Configuration(format!("{} is not a file path", path.display())))?;
    let partial: PathBuf = path.with_file_name(format!(".{name}.part"));

    let written: std::io::Result<()> = async {
        tokio::fs::write(&partial, payload).await?;
        tokio::fs::rename(&partial, path).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            debug!("Could not remove {}: {cleanup}", partial.display());
        }
        return Err(e.into());
    }
    Ok(())
}

async fn release(client: &mut dyn TransportClient) {
    if let Err(e) = client.close().await {
        warn!("Closing the session failed: {e}");
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
