// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Binary acquisition pipeline: cache check, download, archive format
//! sniffing, extraction, permission fix-up.

use crate::archives::Archive;
use crate::errors::AcquireError;
use flate2::read::GzDecoder;
use log::{info, warn};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use xz2::read::XzDecoder;

/// Budget for the whole download, retries included.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Magic header of an xz compressed stream.
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Ensures a runnable copy of the archive's binary exists in `dest_dir` and
/// returns its path.
///
/// Presence of the binary at the canonical path is the sole cache signal:
/// when the file already exists nothing is fetched and nothing is verified.
/// Re-acquiring a different version therefore needs a fresh directory.
pub async fn download_versioned_binary(
    archive: &dyn Archive,
    dest_dir: &Path,
) -> Result<PathBuf, AcquireError> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|source| AcquireError::Directory {
            dir: dest_dir.to_path_buf(),
            source,
        })?;

    let destination = dest_dir.join(archive.binary_name());
    if destination.exists() {
        return Ok(destination);
    }

    let url = archive_url(archive);
    info!("downloading {url}");
    let body = tokio::time::timeout(DEFAULT_DOWNLOAD_TIMEOUT, fetch(&url))
        .await
        .map_err(|_| AcquireError::Download {
            url: url.clone(),
            reason: format!(
                "timed out after {}s",
                DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
            ),
        })??;

    extract_archive(&body, dest_dir, archive).map_err(|source| AcquireError::Extract {
        url: url.clone(),
        source,
    })?;

    if !destination.exists() {
        return Err(AcquireError::BinaryMissing { path: destination });
    }

    tokio::fs::set_permissions(&destination, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|source| AcquireError::Permissions {
            path: destination.clone(),
            source,
        })?;

    Ok(destination)
}

/// Renders the archive's URL template: `{version}` slots and the `{os}` slot.
pub fn archive_url(archive: &dyn Archive) -> String {
    archive
        .url_pattern()
        .replace("{version}", archive.version())
        .replace("{os}", os_name())
}

/// Release archives say "darwin" where Rust says "macos".
fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

async fn fetch(url: &str) -> Result<Vec<u8>, AcquireError> {
    let download_err = |reason: String| AcquireError::Download {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| download_err(e.to_string()))?;

    let mut last_reason = String::new();
    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(RETRY_DELAY).await;
        }
        match try_fetch(&client, url).await {
            Ok(body) => return Ok(body),
            Err(reason) => {
                warn!("download attempt {attempt}/{DOWNLOAD_ATTEMPTS} failed: {reason}");
                last_reason = reason;
            }
        }
    }
    Err(download_err(last_reason))
}

async fn try_fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("server responded with {status}"));
    }
    response
        .bytes()
        .await
        .map(|body| body.to_vec())
        .map_err(|e| e.to_string())
}

/// Unpacks the buffered payload into `dest_dir`, applying the archive's
/// rename policy to every entry.
///
/// The compression format is decided by sniffing the payload's first bytes
/// for the xz magic header, never by the URL or response metadata; anything
/// that is not xz is treated as a gzip-compressed tar stream.
pub fn extract_archive(
    data: &[u8],
    dest_dir: &Path,
    archive: &dyn Archive,
) -> std::io::Result<()> {
    if data.starts_with(&XZ_MAGIC) {
        unpack(tar::Archive::new(XzDecoder::new(data)), dest_dir, archive)
    } else {
        unpack(tar::Archive::new(GzDecoder::new(data)), dest_dir, archive)
    }
}

fn unpack<R: Read>(
    mut tarball: tar::Archive<R>,
    dest_dir: &Path,
    archive: &dyn Archive,
) -> std::io::Result<()> {
    for entry in tarball.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let renamed = archive.rename(&name);
        let Some(relative) = sanitize(Path::new(&renamed)) else {
            warn!("skipping archive entry with unsafe path: {renamed}");
            continue;
        };
        let target = dest_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

/// Drops root and current-dir components and refuses parent-dir traversal.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => return None,
            _ => {}
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
