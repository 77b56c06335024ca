// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::ServiceError;
use async_trait::async_trait;
use clap::{ArgMatches, Command};

/// Outcome of [`Service::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Configuration checked out; the service takes part in the run.
    Enabled,
    /// The service asked to leave the group before acquiring anything.
    /// Terminal: no further lifecycle step runs for it.
    Disabled,
}

/// Uniform lifecycle contract the group scheduler drives.
///
/// Per service the steps are strictly sequential: `capture`, `validate`
/// (which must not cause any network or filesystem side effect), `pre_run`
/// (which acquires binaries, config files, and listeners), then `serve`.
/// `serve` runs on its own task; `graceful_stop` may be called from any
/// other task at any point after construction and must return promptly
/// whether or not anything is running.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Short kebab-case service name, also the flag namespace.
    fn name(&self) -> &'static str;

    /// Declares this service's command line flags.
    fn command(&self, cmd: Command) -> Command {
        cmd
    }

    /// Captures parsed flag values. Runs once, before `validate`.
    fn capture(&mut self, _matches: &ArgMatches) {}

    /// Checks configuration. Returning [`Validation::Disabled`] deregisters
    /// the service from the group.
    fn validate(&mut self) -> Result<Validation, ServiceError>;

    /// Acquires resources for serving.
    async fn pre_run(&mut self) -> Result<(), ServiceError>;

    /// Blocks until the service stops or fails.
    async fn serve(&self) -> Result<(), ServiceError>;

    /// Requests a prompt stop of `serve`. Idempotent; never blocks.
    fn graceful_stop(&self);
}
