// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Subprocess supervision: launch, signal forwarding, wait, exit decoding.

use crate::errors::LaunchError;
use log::{info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;

/// A prepared, not-yet-started child process. Exactly one [`run`] is valid
/// per handle.
pub struct ProcessHandle {
    name: String,
    cmd: Command,
}

impl ProcessHandle {
    pub fn new(name: impl Into<String>, cmd: Command) -> Self {
        Self {
            name: name.into(),
            cmd,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds the child's command: the parent's stdin and stderr, and the given
/// stdout sink (the parent's stdout when `None`). Does not start anything.
pub fn make_command(binary: &Path, args: &[String], stdout: Option<Stdio>) -> Command {
    let mut cmd = Command::new(binary);
    cmd.args(args);
    cmd.stdin(Stdio::inherit());
    cmd.stdout(stdout.unwrap_or_else(Stdio::inherit));
    cmd.stderr(Stdio::inherit());
    cmd
}

/// Runs the prepared command to completion.
///
/// Interrupt and termination signals received by this process while the
/// child runs are forwarded to it verbatim, as often as they arrive.
/// Cancelling `stop` forwards a single interrupt; the call keeps blocking
/// until the child actually exits.
///
/// A non-zero exit is a result, not an error: clean exit returns `Ok(0)`,
/// exit code N returns `Ok(N)`, and a child killed by signal S returns
/// `Ok(128 + S)`. Only failing to start or wait is an error, which callers
/// surface alongside exit code 1.
pub async fn run(mut handle: ProcessHandle, stop: CancellationToken) -> Result<i32, LaunchError> {
    let mut child = handle.cmd.spawn().map_err(|source| LaunchError::Spawn {
        binary: handle.name.clone(),
        source,
    })?;
    let pid = child.id();
    info!("[{}] started (pid={})", handle.name, pid.unwrap_or(0));

    let mut sigint = unix_signal(SignalKind::interrupt()).map_err(|source| {
        LaunchError::Signals {
            binary: handle.name.clone(),
            source,
        }
    })?;
    let mut sigterm = unix_signal(SignalKind::terminate()).map_err(|source| {
        LaunchError::Signals {
            binary: handle.name.clone(),
            source,
        }
    })?;

    let mut stop_requested = false;
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| LaunchError::Wait {
                    binary: handle.name.clone(),
                    source,
                })?;
                info!("[{}] exited with {status}", handle.name);
                return Ok(decode_exit_status(status));
            }
            _ = sigint.recv() => forward(&handle.name, pid, Signal::SIGINT),
            _ = sigterm.recv() => forward(&handle.name, pid, Signal::SIGTERM),
            _ = stop.cancelled(), if !stop_requested => {
                stop_requested = true;
                forward(&handle.name, pid, Signal::SIGINT);
            }
        }
    }
}

/// Best effort: a failure to deliver is logged, never raised.
fn forward(name: &str, pid: Option<u32>, sig: Signal) {
    let Some(pid) = pid else {
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
        warn!("[{name}] failed to send {sig}: {e}");
    }
}

fn decode_exit_status(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
