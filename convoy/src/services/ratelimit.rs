// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Wraps the rate-limit server binary as a managed service.

use crate::archives::{Archive, RateLimit};
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

const SERVICE_NAME: &str = "rate-limit-service";

pub const DEFAULT_BINARY_VERSION: &str = "0.8.0";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_grpc_port() -> u16 {
    8081
}

/// The rate-limit server's settings. Only the knobs the wrapper cares about
/// are modeled; unset fields are left out of the generated file so the
/// binary applies its own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub grpc_host: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_subdirectory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_socket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_statsd: Option<bool>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            grpc_host: default_host(),
            grpc_port: default_grpc_port(),
            debug_host: None,
            log_level: None,
            log_format: None,
            runtime_path: None,
            runtime_subdirectory: None,
            redis_socket_type: None,
            redis_url: None,
            use_statsd: None,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            service: SERVICE_NAME,
            reason,
        };
        if self.host.is_empty() || self.grpc_host.is_empty() {
            return Err(invalid("host and grpc_host must not be empty".into()));
        }
        if self.port == self.grpc_port {
            return Err(invalid(format!(
                "http and grpc ports must differ (both {})",
                self.port
            )));
        }
        if let Some(level) = &self.log_level
            && !LOG_LEVELS.contains(&level.as_str())
        {
            return Err(invalid(format!(
                "unknown log_level {level:?}, expected one of {LOG_LEVELS:?}"
            )));
        }
        if let Some(format) = &self.log_format
            && !LOG_FORMATS.contains(&format.as_str())
        {
            return Err(invalid(format!(
                "unknown log_format {format:?}, expected one of {LOG_FORMATS:?}"
            )));
        }
        Ok(())
    }
}

/// Managed service that downloads, configures, and supervises the rate-limit
/// server.
pub struct RateLimitService {
    config: Option<RateLimitConfig>,
    flags: ManagedFlags,
    handle: Mutex<Option<ProcessHandle>>,
    stop: CancellationToken,
}

impl RateLimitService {
    /// `config` may be `None` when the settings come from
    /// `--rate-limit-service-config`.
    pub fn new(config: Option<RateLimitConfig>) -> Self {
        Self {
            config,
            flags: ManagedFlags::for_binary(SERVICE_NAME, DEFAULT_BINARY_VERSION),
            handle: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Service for RateLimitService {
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
        let archive = RateLimit {
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

        let args = vec!["--config".to_string(), config_path.display().to_string()];
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

    fn capture(service: &mut RateLimitService, args: &[&str]) {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        let matches = service.command(Command::new("test")).get_matches_from(argv);
        service.capture(&matches);
    }

    #[test]
    fn test_validate_requires_config() {
        let mut service = RateLimitService::new(None);
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert_eq!(err.to_string(), "rate-limit-service config is required");
    }

    #[test]
    fn test_disable_short_circuits_validation() {
        let mut service = RateLimitService::new(None);
        capture(&mut service, &["--disable-rate-limit-service"]);
        assert_eq!(service.validate().unwrap(), Validation::Disabled);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let mut service = RateLimitService::new(Some(RateLimitConfig::default()));
        capture(&mut service, &[]);
        assert_eq!(service.validate().unwrap(), Validation::Enabled);
    }

    #[test]
    fn test_validate_rejects_port_collision() {
        let config = RateLimitConfig {
            port: 9000,
            grpc_port: 9000,
            ..RateLimitConfig::default()
        };
        let mut service = RateLimitService::new(Some(config));
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert!(err.to_string().contains("ports must differ"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let config = RateLimitConfig {
            log_format: Some("xml".into()),
            ..RateLimitConfig::default()
        };
        let mut service = RateLimitService::new(Some(config));
        capture(&mut service, &[]);
        assert!(service.validate().is_err());
    }

    #[test]
    fn test_yaml_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            "host: 127.0.0.1\nport: 7000\ngrpc_port: 7001\nredis_url: redis://localhost:6379\n",
        )
        .unwrap();

        let mut service = RateLimitService::new(None);
        capture(
            &mut service,
            &["--rate-limit-service-config", path.to_str().unwrap()],
        );
        assert_eq!(service.validate().unwrap(), Validation::Enabled);

        let config = service.config.unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7000);
        assert_eq!(config.grpc_host, "0.0.0.0", "unset fields take defaults");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
    }
}
