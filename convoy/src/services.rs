// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle adapters for each member of the fleet.

pub mod extauthz;
pub mod proxy;
pub mod ratelimit;
pub mod xds;

use crate::errors::AcquireError;
use std::path::PathBuf;

/// Creates a persistent work directory under the system temp dir when the
/// caller did not supply one. Downloaded binaries are cached there for
/// reuse, so nothing ever cleans it up.
pub(crate) fn work_dir(binary_name: &str) -> Result<PathBuf, AcquireError> {
    let dir = tempfile::Builder::new()
        .prefix(binary_name)
        .tempdir()
        .map_err(|source| AcquireError::Directory {
            dir: std::env::temp_dir(),
            source,
        })?;
    Ok(dir.keep())
}
