// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Runs a small fleet of managed network services as one unit: external
//! binaries that are downloaded, configured, and supervised as subprocesses,
//! plus an in-process control-plane server, all driven through the same
//! lifecycle by a group scheduler.

pub mod archives;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod flags;
pub mod group;
pub mod runner;
pub mod service;
pub mod services;
pub mod snapshot;

pub use group::Group;
pub use service::{Service, Validation};
