// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Wraps the external authorization server binary as a managed service.

use crate::archives::{Archive, ExtAuthz};
use crate::config;
use crate::downloader;
use crate::errors::{ConfigError, ServiceError};
use crate::flags::ManagedFlags;
use crate::runner::{self, ProcessHandle};
use crate::service::{Service, Validation};
use async_trait::async_trait;
use clap::{ArgMatches, Command};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "external-auth-service";

pub const DEFAULT_BINARY_VERSION: &str = "0.6.0-rc0";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "error", "critical"];

fn default_log_level() -> String {
    "info".to_string()
}

fn default_threads() -> u32 {
    8
}

/// The auth server's filter configuration. Chains pass through opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    pub listen_address: String,
    pub listen_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default)]
    pub chains: Vec<serde_json::Value>,
}

impl AuthzConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            service: SERVICE_NAME,
            reason,
        };
        if self.listen_address.is_empty() {
            return Err(invalid("listen_address must not be empty".into()));
        }
        if self.listen_port == 0 {
            return Err(invalid("listen_port must not be zero".into()));
        }
        if self.chains.is_empty() {
            return Err(invalid("at least one filter chain is required".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(invalid(format!(
                "unknown log_level {:?}, expected one of {LOG_LEVELS:?}",
                self.log_level
            )));
        }
        if self.threads == 0 {
            return Err(invalid("threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Managed service that downloads, configures, and supervises the auth
/// server.
pub struct ExtAuthzService {
    config: Option<AuthzConfig>,
    flags: ManagedFlags,
    handle: Mutex<Option<ProcessHandle>>,
    stop: CancellationToken,
}

impl ExtAuthzService {
    /// `config` may be `None` when the filter configuration comes from
    /// `--external-auth-service-config`.
    pub fn new(config: Option<AuthzConfig>) -> Self {
        Self {
            config,
            flags: ManagedFlags::for_binary(SERVICE_NAME, DEFAULT_BINARY_VERSION),
            handle: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Service for ExtAuthzService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn command(&self, cmd: Command) -> Command {
        self.flags.command(cmd)
    }

    fn capture(&mut self, matches: &ArgMatches) {
        self.flags.capture(matches);
    }

    fn validate(&mut self) -> Result<Validation, ServiceError> {
        if self.flags.is_disabled() {
            return Ok(Validation::Disabled);
        }
        if let Some(path) = &self.flags.config_file {
            self.config = Some(config::load(SERVICE_NAME, path)?);
        }
        let cfg = self
            .config
            .as_ref()
            .ok_or(ConfigError::Missing {
                service: SERVICE_NAME,
            })?;
        cfg.validate()?;
        Ok(Validation::Enabled)
    }

    async fn pre_run(&mut self) -> Result<(), ServiceError> {
        let archive = ExtAuthz {
            version_used: self.flags.version.clone(),
        };
        let dir = match &self.flags.dir {
            Some(dir) => dir.clone(),
            None => super::work_dir(archive.binary_name())?,
        };

        let binary_path = downloader::download_versioned_binary(&archive, &dir).await?;

        let cfg = self
            .config
            .as_ref()
            .ok_or(ConfigError::Missing {
                service: SERVICE_NAME,
            })?;
        let json = serde_json::to_vec(cfg).map_err(|e| ConfigError::Invalid {
            service: SERVICE_NAME,
            reason: e.to_string(),
        })?;
        let config_path = config::write_config_file(&json, &dir)?;

        let args = vec![
            "--filter_config".to_string(),
            config_path.display().to_string(),
        ];
        let cmd = runner::make_command(&binary_path, &args, None);
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(ProcessHandle::new(archive.binary_name(), cmd));
        Ok(())
    }

    async fn serve(&self) -> Result<(), ServiceError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return Err(ServiceError::NotPrepared {
                service: SERVICE_NAME,
            });
        };
        let binary = handle.name().to_string();
        match runner::run(handle, self.stop.clone()).await {
            Ok(0) => Ok(()),
            Ok(code) => {
                error!("[{SERVICE_NAME}] {binary} exited with code {code}");
                Err(ServiceError::ChildExit { binary, code })
            }
            Err(e) => {
                error!("[{SERVICE_NAME}] {e}");
                Err(ServiceError::Launch(e))
            }
        }
    }

    fn graceful_stop(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(service: &mut ExtAuthzService, args: &[&str]) {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        let matches = service.command(Command::new("test")).get_matches_from(argv);
        service.capture(&matches);
    }

    fn minimal_config() -> AuthzConfig {
        AuthzConfig {
            listen_address: "127.0.0.1".into(),
            listen_port: 10003,
            log_level: default_log_level(),
            threads: default_threads(),
            chains: vec![serde_json::json!({"name": "default"})],
        }
    }

    #[test]
    fn test_validate_requires_config() {
        let mut service = ExtAuthzService::new(None);
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert_eq!(err.to_string(), "external-auth-service config is required");
    }

    #[test]
    fn test_disable_short_circuits_validation() {
        let mut service = ExtAuthzService::new(None);
        capture(&mut service, &["--disable-external-auth-service"]);
        assert_eq!(service.validate().unwrap(), Validation::Disabled);
    }

    #[test]
    fn test_validate_loads_json_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&minimal_config()).unwrap(),
        )
        .unwrap();

        let mut service = ExtAuthzService::new(None);
        capture(
            &mut service,
            &["--external-auth-service-config", path.to_str().unwrap()],
        );
        assert_eq!(service.validate().unwrap(), Validation::Enabled);
        assert_eq!(service.config.unwrap().listen_port, 10003);
    }

    #[test]
    fn test_validate_rejects_empty_chains() {
        let mut config = minimal_config();
        config.chains.clear();
        let mut service = ExtAuthzService::new(Some(config));
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert!(err.to_string().contains("filter chain"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = minimal_config();
        config.log_level = "verbose".into();
        let mut service = ExtAuthzService::new(Some(config));
        capture(&mut service, &[]);
        assert!(service.validate().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config: AuthzConfig = serde_json::from_value(serde_json::json!({
            "listen_address": "0.0.0.0",
            "listen_port": 10003,
            "chains": [{"name": "default"}],
        }))
        .unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.threads, 8);
    }
}
