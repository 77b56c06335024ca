// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-process control-plane server.
//!
//! Structurally different from the binary-wrapping services: instead of
//! acquiring and launching anything, preparation builds a snapshot store,
//! seeds it, and binds the listener; serving answers snapshot requests until
//! told to stop.

use crate::errors::{ConfigError, ServiceError};
use crate::flags::ManagedFlags;
use crate::service::{Service, Validation};
use crate::snapshot::{Snapshot, SnapshotCache};
use async_trait::async_trait;
use clap::{ArgMatches, Command};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "xds-service";

/// Node id the store is seeded under.
pub const SEED_NODE_ID: &str = "test-id";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XdsConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl XdsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            service: SERVICE_NAME,
            reason,
        };
        if self.host.is_empty() {
            return Err(invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(invalid("port must not be zero".into()));
        }
        Ok(())
    }
}

/// The control-plane server as a managed service.
pub struct XdsService {
    config: Option<XdsConfig>,
    flags: ManagedFlags,
    cache: Arc<SnapshotCache>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    stop: CancellationToken,
}

impl XdsService {
    /// `config` may be `None` when it comes from `--xds-service-config`.
    pub fn new(config: Option<XdsConfig>) -> Self {
        Self {
            config,
            flags: ManagedFlags::in_process(SERVICE_NAME),
            cache: Arc::new(SnapshotCache::new()),
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }

    /// The snapshot store, for embedders that push updates at runtime.
    pub fn cache(&self) -> Arc<SnapshotCache> {
        Arc::clone(&self.cache)
    }

    /// Bound address, available once `pre_run` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Service for XdsService {
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
            self.config = Some(crate::config::load(SERVICE_NAME, path)?);
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
        let cfg = self
            .config
            .as_ref()
            .ok_or(ConfigError::Missing {
                service: SERVICE_NAME,
            })?;

        self.cache
            .set(SEED_NODE_ID, Snapshot::example())
            .map_err(|reason| ConfigError::Invalid {
                service: SERVICE_NAME,
                reason,
            })?;

        let addr = format!("{}:{}", cfg.host, cfg.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServiceError::Listen { addr, source })?;
        if let Ok(local) = listener.local_addr() {
            info!("[{SERVICE_NAME}] listening on {local}");
            *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(local);
        }
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
        Ok(())
    }

    async fn serve(&self) -> Result<(), ServiceError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(listener) = listener else {
            return Err(ServiceError::NotPrepared {
                service: SERVICE_NAME,
            });
        };

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let io = TokioIo::new(stream);
                            let cache = Arc::clone(&self.cache);
                            connections.spawn(async move {
                                let served = http1::Builder::new()
                                    .serve_connection(
                                        io,
                                        service_fn(move |req| {
                                            handle_request(req, Arc::clone(&cache))
                                        }),
                                    )
                                    .await;
                                if let Err(e) = served {
                                    error!("[{SERVICE_NAME}] error serving connection: {e}");
                                }
                            });
                        }
                        Err(e) => error!("[{SERVICE_NAME}] accept failed: {e}"),
                    }
                }
                _ = self.stop.cancelled() => break,
            }
        }

        // Stop accepting, then drain in-flight connections.
        drop(listener);
        while connections.join_next().await.is_some() {}
        info!("[{SERVICE_NAME}] listener drained");
        Ok(())
    }

    fn graceful_stop(&self) {
        self.stop.cancel();
    }
}

type ResponseBody = BoxBody<Bytes, std::io::Error>;

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    cache: Arc<SnapshotCache>,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let path = req.uri().path().to_string();
    match (req.method().clone(), path) {
        (Method::GET, path) if path.starts_with("/snapshots/") => {
            let node = path.trim_start_matches("/snapshots/");
            match cache.get(node) {
                Some(snapshot) => Ok(json_response(StatusCode::OK, &snapshot)),
                None => Ok(text_response(StatusCode::NOT_FOUND, "Not found")),
            }
        }
        (Method::PUT, path) if path.starts_with("/snapshots/") => {
            let node = path.trim_start_matches("/snapshots/").to_string();
            let body = req.collect().await?.to_bytes();
            let snapshot: Snapshot = match serde_json::from_slice(&body) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid snapshot: {e}"),
                    ));
                }
            };
            match cache.set(&node, snapshot) {
                Ok(()) => Ok(json_response(StatusCode::OK, &json!({"node": node}))),
                Err(reason) => Ok(text_response(StatusCode::BAD_REQUEST, &reason)),
            }
        }
        (Method::GET, path) if path == "/debug/stats" => {
            Ok(json_response(StatusCode::OK, &json!({"nodes": cache.len()})))
        }
        (method, path) => {
            info!("[{SERVICE_NAME}] {method} request to unknown endpoint: {path}");
            Ok(text_response(StatusCode::NOT_FOUND, "Not found"))
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let body = serde_json::to_vec(value).unwrap_or_else(|e| {
        error!("[{SERVICE_NAME}] failed to serialize response: {e}");
        b"Internal server error".to_vec()
    });
    let mut response = Response::new(Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed());
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn text_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let mut response = Response::new(
        Full::new(Bytes::from(message.to_string()))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}
