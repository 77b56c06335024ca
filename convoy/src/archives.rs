// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Release archive metadata for the external binaries the fleet runs.
//!
//! Adding a new wrapped binary means adding a new [`Archive`] variant here;
//! the acquisition pipeline and the lifecycle adapters stay untouched.

use std::path::Path;

const PROXY_DEFAULT_VERSION: &str = "1.21.0";
const EXT_AUTHZ_DEFAULT_VERSION: &str = "0.6.0-rc0";
const RATE_LIMIT_DEFAULT_VERSION: &str = "0.8.0";

/// Describes how to fetch, name, and extract one external binary.
pub trait Archive: Send + Sync {
    /// Version to download: the explicit override if set, else a hard-coded
    /// default.
    fn version(&self) -> &str;

    /// Canonical name of the binary inside the destination directory.
    fn binary_name(&self) -> &'static str;

    /// Download URL template with `{version}` and `{os}` slots. Architecture
    /// is always 64-bit x86 and is baked into the pattern.
    fn url_pattern(&self) -> &str;

    /// Maps an extracted entry name to its final name, so a generically
    /// named binary inside the archive lands at the canonical path.
    fn rename(&self, name: &str) -> String;
}

/// The network proxy release archive.
#[derive(Debug, Default)]
pub struct Proxy {
    pub version_used: Option<String>,
}

impl Archive for Proxy {
    fn version(&self) -> &str {
        self.version_used.as_deref().unwrap_or(PROXY_DEFAULT_VERSION)
    }

    fn binary_name(&self) -> &'static str {
        "envoy"
    }

    fn url_pattern(&self) -> &str {
        "https://archive.tetratelabs.io/envoy/download/v{version}/envoy-v{version}-{os}-amd64.tar.xz"
    }

    fn rename(&self, name: &str) -> String {
        // The release tarball nests the binary under a versioned directory;
        // flatten it and keep everything else where it was.
        let base = base_name(name);
        if base == self.binary_name() {
            base.to_string()
        } else {
            name.to_string()
        }
    }
}

/// The authorization server release archive.
#[derive(Debug, Default)]
pub struct ExtAuthz {
    pub version_used: Option<String>,
}

impl Archive for ExtAuthz {
    fn version(&self) -> &str {
        self.version_used.as_deref().unwrap_or(EXT_AUTHZ_DEFAULT_VERSION)
    }

    fn binary_name(&self) -> &'static str {
        "auth_server"
    }

    fn url_pattern(&self) -> &str {
        "https://github.com/dio/authservice/releases/download/v{version}/auth_server_{version}_{os}_amd64.tar.gz"
    }

    fn rename(&self, name: &str) -> String {
        // Releases ship the binary as `auth_server.stripped`.
        if name == format!("{}.stripped", self.binary_name()) {
            self.binary_name().to_string()
        } else {
            name.to_string()
        }
    }
}

/// The rate-limit server release archive.
#[derive(Debug, Default)]
pub struct RateLimit {
    pub version_used: Option<String>,
}

impl Archive for RateLimit {
    fn version(&self) -> &str {
        self.version_used.as_deref().unwrap_or(RATE_LIMIT_DEFAULT_VERSION)
    }

    fn binary_name(&self) -> &'static str {
        "ratelimit"
    }

    fn url_pattern(&self) -> &str {
        "https://github.com/envoyproxy/ratelimit/releases/download/v{version}/ratelimit_{version}_{os}_amd64.tar.gz"
    }

    fn rename(&self, name: &str) -> String {
        let base = base_name(name);
        if base == self.binary_name() {
            base.to_string()
        } else {
            name.to_string()
        }
    }
}

fn base_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or(name)
}
