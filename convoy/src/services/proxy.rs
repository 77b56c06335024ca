// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Wraps the network proxy binary as a managed service.

use crate::archives::{Archive, Proxy};
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

const SERVICE_NAME: &str = "proxy";

pub const DEFAULT_BINARY_VERSION: &str = "1.21.0";

/// Subset of the proxy bootstrap the wrapper understands. Resource sections
/// pass through opaquely; the binary does its own full validation at start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_resources: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_resources: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_resources.is_none() && self.dynamic_resources.is_none() {
            return Err(ConfigError::Invalid {
                service: SERVICE_NAME,
                reason: "bootstrap declares neither static nor dynamic resources".into(),
            });
        }
        if let Some(node) = &self.node
            && node.id.is_empty()
        {
            return Err(ConfigError::Invalid {
                service: SERVICE_NAME,
                reason: "node.id must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Managed service that downloads, configures, and supervises the proxy.
pub struct ProxyService {
    config: Option<ProxyConfig>,
    flags: ManagedFlags,
    handle: Mutex<Option<ProcessHandle>>,
    stop: CancellationToken,
}

impl ProxyService {
    /// `config` may be `None` when the bootstrap comes from `--proxy-config`.
    pub fn new(config: Option<ProxyConfig>) -> Self {
        Self {
            config,
            flags: ManagedFlags::for_binary(SERVICE_NAME, DEFAULT_BINARY_VERSION),
            handle: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Service for ProxyService {
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
        let archive = Proxy {
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

        let args = vec!["-c".to_string(), config_path.display().to_string()];
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

    fn capture(service: &mut ProxyService, args: &[&str]) {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        let matches = service.command(Command::new("test")).get_matches_from(argv);
        service.capture(&matches);
    }

    fn minimal_config() -> ProxyConfig {
        ProxyConfig {
            static_resources: Some(serde_json::json!({"listeners": []})),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn test_validate_requires_config() {
        let mut service = ProxyService::new(None);
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert_eq!(err.to_string(), "proxy config is required");
    }

    #[test]
    fn test_validate_accepts_preset_config() {
        let mut service = ProxyService::new(Some(minimal_config()));
        capture(&mut service, &[]);
        assert_eq!(service.validate().unwrap(), Validation::Enabled);
    }

    #[test]
    fn test_disable_short_circuits_validation() {
        // No config anywhere, yet validation succeeds as Disabled.
        let mut service = ProxyService::new(None);
        capture(&mut service, &["--disable-proxy"]);
        assert_eq!(service.validate().unwrap(), Validation::Disabled);
    }

    #[test]
    fn test_validate_loads_yaml_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(
            &path,
            "node:\n  id: proxy-1\nstatic_resources:\n  listeners: []\n",
        )
        .unwrap();

        let mut service = ProxyService::new(None);
        capture(
            &mut service,
            &["--proxy-config", path.to_str().unwrap()],
        );
        assert_eq!(service.validate().unwrap(), Validation::Enabled);
        assert_eq!(service.config.unwrap().node.unwrap().id, "proxy-1");
    }

    #[test]
    fn test_validate_rejects_empty_bootstrap() {
        let mut service = ProxyService::new(Some(ProxyConfig::default()));
        capture(&mut service, &[]);
        let err = service.validate().unwrap_err();
        assert!(err.to_string().contains("neither static nor dynamic"));
    }

    #[test]
    fn test_validate_rejects_empty_node_id() {
        let mut config = minimal_config();
        config.node = Some(Node {
            id: String::new(),
            cluster: None,
        });
        let mut service = ProxyService::new(Some(config));
        capture(&mut service, &[]);
        assert!(service.validate().is_err());
    }

    #[tokio::test]
    async fn test_serve_without_pre_run() {
        let service = ProxyService::new(Some(minimal_config()));
        let err = service.serve().await.unwrap_err();
        assert!(matches!(err, ServiceError::NotPrepared { .. }));
    }

    #[test]
    fn test_graceful_stop_without_child_is_a_noop() {
        let service = ProxyService::new(None);
        service.graceful_stop();
        service.graceful_stop();
    }
}
