// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the binary acquisition pipeline, in pipeline order.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("could not create directory {}: {source}", .dir.display())]
    Directory { dir: PathBuf, source: std::io::Error },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("failed to extract archive from {url}: {source}")]
    Extract { url: String, source: std::io::Error },

    #[error("binary {} not found after extraction", .path.display())]
    BinaryMissing { path: PathBuf },

    #[error("could not make {} executable: {source}", .path.display())]
    Permissions { path: PathBuf, source: std::io::Error },
}

/// Configuration loading, validation, and materialization failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{service} config is required")]
    Missing { service: &'static str },

    #[error("failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to convert {} from YAML: {source}", .path.display())]
    Yaml { path: PathBuf, source: serde_yaml::Error },

    #[error("failed to re-encode {} as JSON: {source}", .path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    #[error("invalid {service} config: {reason}")]
    Invalid { service: &'static str, reason: String },

    #[error("could not write generated config in {}: {source}", .dir.display())]
    Write { dir: PathBuf, source: std::io::Error },
}

/// The supervisor could not even run the child. A non-zero exit is not a
/// launch error; it comes back as a plain exit code.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to start {binary}: {source}")]
    Spawn { binary: String, source: std::io::Error },

    #[error("failed to install signal listeners for {binary}: {source}")]
    Signals { binary: String, source: std::io::Error },

    #[error("failed to wait for {binary}: {source}")]
    Wait { binary: String, source: std::io::Error },
}

/// Everything a service can report back to the group scheduler.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The child ran and exited non-zero. Distinguishes "my subprocess
    /// misbehaved" from "I could not even start".
    #[error("{binary} exited with code {code}")]
    ChildExit { binary: String, code: i32 },

    #[error("failed to bind {addr}: {source}")]
    Listen { addr: String, source: std::io::Error },

    #[error("{service} has nothing prepared to run")]
    NotPrepared { service: &'static str },
}
