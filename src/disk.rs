//! Backing disk creation.
//!
//! The guest formats its data disk on first boot only when the disk starts
//! with [`FORMAT_SENTINEL`]. We write a sparse raw image carrying the sentinel
//! and let the hypervisor tool convert it into the final VMDK.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::B2dError;
use crate::paths;
use crate::runner::CommandRunner;
use crate::vbox::VBoxManage;

pub const FORMAT_SENTINEL: &[u8] = b"boot2docker, please format-me\n";

/// Write a raw image of exactly `size` bytes starting with the sentinel.
///
/// The remainder is left sparse.
pub async fn write_seed_image(path: &Path, size: u64) -> Result<(), B2dError> {
    let io_err = |context: String| move |e: std::io::Error| B2dError::Io { context, source: e };

    if size < FORMAT_SENTINEL.len() as u64 {
        return Err(B2dError::Io {
            context: format!("disk image of {size} bytes cannot hold the format sentinel"),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "image too small"),
        });
    }

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(io_err(format!("creating {}", path.display())))?;
    file.write_all(FORMAT_SENTINEL)
        .await
        .map_err(io_err(format!("writing sentinel to {}", path.display())))?;
    file.set_len(size)
        .await
        .map_err(io_err(format!("sizing {}", path.display())))?;
    file.sync_all()
        .await
        .map_err(io_err(format!("syncing {}", path.display())))?;
    Ok(())
}

/// Create the backing disk at `disk` with a virtual size of `size` bytes.
pub async fn provision_disk<R: CommandRunner>(
    vbox: &VBoxManage<R>,
    disk: &Path,
    size: u64,
) -> Result<(), B2dError> {
    if let Some(parent) = disk.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| B2dError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
    }

    let raw = paths::staging_raw_path(disk);
    tracing::info!(path = %disk.display(), size_mb = size / (1024 * 1024), "creating disk image");

    let result = match write_seed_image(&raw, size).await {
        Ok(()) => vbox.convert_from_raw(&raw, disk).await,
        Err(e) => Err(e),
    };

    // Staging file is removed whether or not conversion succeeded.
    let _ = tokio::fs::remove_file(&raw).await;
    result
}
