// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Config file reading and materialization.
//!
//! User-supplied files may be YAML or JSON; the external binaries only ever
//! see canonical JSON at a freshly generated path they control.

use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads a config file as canonical JSON bytes. `.yaml`/`.yml` files are
/// converted by extension; everything else is assumed to be JSON already.
pub fn read_config_bytes(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if !is_yaml(path) {
        return Ok(raw);
    }
    let value: serde_json::Value =
        serde_yaml::from_slice(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::to_vec(&value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and deserializes a config file into the service's schema.
pub fn load<T: DeserializeOwned>(service: &'static str, path: &Path) -> Result<T, ConfigError> {
    let bytes = read_config_bytes(path)?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Invalid {
        service,
        reason: source.to_string(),
    })
}

/// Writes serialized configuration to a fresh uniquely-named `.json` file
/// inside `dir` and returns its path.
///
/// One file per launch; the file is kept on disk for the child process and
/// nothing here ever cleans it up.
pub fn write_config_file(json: &[u8], dir: &Path) -> Result<PathBuf, ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        dir: dir.to_path_buf(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(write_err)?;
    file.write_all(json).map_err(write_err)?;
    let (_, path) = file.keep().map_err(|e| write_err(e.error))?;
    Ok(path)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        host: String,
        port: u16,
    }

    #[test]
    fn test_read_json_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, br#"{"host":"127.0.0.1","port":9000}"#).unwrap();

        let bytes = read_config_bytes(&path).unwrap();
        assert_eq!(bytes, br#"{"host":"127.0.0.1","port":9000}"#);
    }

    #[test]
    fn test_read_yaml_converts_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "host: 127.0.0.1\nport: 9000\n").unwrap();

        let sample: Sample = load("test", &path).unwrap();
        assert_eq!(
            sample,
            Sample {
                host: "127.0.0.1".into(),
                port: 9000
            }
        );
    }

    #[test]
    fn test_read_yml_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yml");
        std::fs::write(&path, "host: localhost\nport: 1\n").unwrap();

        let sample: Sample = load("test", &path).unwrap();
        assert_eq!(sample.host, "localhost");
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_config_bytes(Path::new("/nonexistent/cfg.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_rejects_bad_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, br#"{"host":"x","port":"not a number"}"#).unwrap();

        let err = load::<Sample>("test", &path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { service: "test", .. }));
    }

    #[test]
    fn test_load_rejects_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "host: [unclosed\n").unwrap();

        let err = load::<Sample>("test", &path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn test_write_config_file_is_fresh_and_kept() {
        let dir = tempfile::tempdir().unwrap();

        let first = write_config_file(b"{}", dir.path()).unwrap();
        let second = write_config_file(b"{}", dir.path()).unwrap();

        assert_ne!(first, second, "each launch gets its own file");
        assert!(first.exists() && second.exists());
        assert_eq!(first.extension().unwrap(), "json");
        assert_eq!(std::fs::read(&first).unwrap(), b"{}");
    }

    #[test]
    fn test_write_config_file_missing_dir() {
        let err = write_config_file(b"{}", Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::Write { .. }));
    }
}
