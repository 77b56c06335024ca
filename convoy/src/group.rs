// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Group scheduler: registers services and drives their shared lifecycle.

use crate::service::{Service, Validation};
use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinSet;

/// Runs a set of registered services through flag parsing, validation, and
/// preparation, then serves them concurrently with stop propagation on the
/// first failure or external interrupt.
///
/// Validation runs before any network or filesystem side effect: a service
/// returning [`Validation::Disabled`] is deregistered on the spot, and a
/// validation error aborts the whole run before anything is acquired.
/// Destination directories are owned exclusively by one service each; the
/// group does not enforce this.
pub struct Group {
    name: String,
    services: Vec<Box<dyn Service>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    pub fn register(&mut self, service: impl Service) {
        self.services.push(Box::new(service));
    }

    /// Runs the group against the process's command line.
    pub async fn run(self) -> Result<()> {
        let args: Vec<String> = std::env::args().collect();
        self.run_with_args(args).await
    }

    pub async fn run_with_args(mut self, args: Vec<String>) -> Result<()> {
        let mut cmd = clap::Command::new(self.name.clone());
        for service in &self.services {
            cmd = service.command(cmd);
        }
        let matches = cmd.try_get_matches_from(args)?;
        for service in &mut self.services {
            service.capture(&matches);
        }

        let mut enabled: Vec<Box<dyn Service>> = Vec::new();
        for mut service in std::mem::take(&mut self.services) {
            let name = service.name();
            match service.validate() {
                Ok(Validation::Enabled) => enabled.push(service),
                Ok(Validation::Disabled) => {
                    info!("[{name}] disabled, deregistered from the group");
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("validating {name}")));
                }
            }
        }
        if enabled.is_empty() {
            info!("[{}] nothing to run", self.name);
            return Ok(());
        }

        for service in &mut enabled {
            let name = service.name();
            service
                .pre_run()
                .await
                .with_context(|| format!("preparing {name}"))?;
        }

        let services: Vec<Arc<dyn Service>> = enabled.into_iter().map(Arc::from).collect();
        self.serve_all(services).await
    }

    async fn serve_all(&self, services: Vec<Arc<dyn Service>>) -> Result<()> {
        let mut tasks = JoinSet::new();
        for service in &services {
            let service = Arc::clone(service);
            tasks.spawn(async move {
                let result = service.serve().await;
                (service.name(), result)
            });
        }

        let mut sigint =
            unix_signal(SignalKind::interrupt()).context("installing SIGINT listener")?;
        let mut sigterm =
            unix_signal(SignalKind::terminate()).context("installing SIGTERM listener")?;

        let mut first_err: Option<anyhow::Error> = None;
        let mut stopping = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((name, Ok(())))) => info!("[{name}] serve finished"),
                        Some(Ok((name, Err(e)))) => {
                            error!("[{name}] {e}");
                            if first_err.is_none() {
                                first_err =
                                    Some(anyhow::Error::new(e).context(format!("serving {name}")));
                            }
                            if !stopping {
                                stopping = true;
                                stop_all(&services);
                            }
                        }
                        Some(Err(e)) => {
                            if first_err.is_none() {
                                first_err = Some(anyhow::Error::new(e).context("serve task aborted"));
                            }
                            if !stopping {
                                stopping = true;
                                stop_all(&services);
                            }
                        }
                    }
                }
                _ = sigint.recv(), if !stopping => {
                    info!("[{}] received interrupt, stopping all services", self.name);
                    stopping = true;
                    stop_all(&services);
                }
                _ = sigterm.recv(), if !stopping => {
                    info!("[{}] received termination, stopping all services", self.name);
                    stopping = true;
                    stop_all(&services);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Stop requests are best effort and never raise errors.
fn stop_all(services: &[Arc<dyn Service>]) {
    for service in services {
        service.graceful_stop();
    }
}
