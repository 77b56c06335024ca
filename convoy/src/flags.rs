// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Common command line flags shared by every managed service, namespaced by
//! service name: `--<service>-config`, `--<service>-version`,
//! `--<service>-directory`, `--disable-<service>`.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Flag state for one managed service.
///
/// Services wrapping a downloadable binary get the full set; in-process
/// services register only the config and disable flags.
pub struct ManagedFlags {
    service: &'static str,
    title: String,
    default_version: Option<&'static str>,
    pub version: Option<String>,
    pub dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    disabled: bool,
}

impl ManagedFlags {
    /// Flags for a service that wraps a downloadable external binary.
    pub fn for_binary(service: &'static str, default_version: &'static str) -> Self {
        Self {
            service,
            title: titleize(service),
            default_version: Some(default_version),
            version: None,
            dir: None,
            config_file: None,
            disabled: false,
        }
    }

    /// Flags for an in-process service: config and disable only.
    pub fn in_process(service: &'static str) -> Self {
        Self {
            service,
            title: titleize(service),
            default_version: None,
            version: None,
            dir: None,
            config_file: None,
            disabled: false,
        }
    }

    pub fn command(&self, mut cmd: Command) -> Command {
        let service = self.service;
        if let Some(default_version) = self.default_version {
            cmd = cmd.arg(
                Arg::new(format!("{service}-version"))
                    .long(format!("{service}-version"))
                    .value_name("VERSION")
                    .default_value(default_version)
                    .help(format!("{} version", self.title)),
            );
            cmd = cmd.arg(
                Arg::new(format!("{service}-directory"))
                    .long(format!("{service}-directory"))
                    .value_name("PATH")
                    .env(home_env_var(service))
                    .help(format!("Path to the {} work directory", self.title)),
            );
        }
        cmd = cmd.arg(
            Arg::new(format!("{service}-config"))
                .long(format!("{service}-config"))
                .value_name("PATH")
                .help(format!("Path to the {} config file", self.title)),
        );
        cmd.arg(
            Arg::new(format!("disable-{service}"))
                .long(format!("disable-{service}"))
                .action(ArgAction::SetTrue)
                .help(format!("Disable {}", self.title)),
        )
    }

    pub fn capture(&mut self, matches: &ArgMatches) {
        let service = self.service;
        if self.default_version.is_some() {
            self.version = matches
                .get_one::<String>(&format!("{service}-version"))
                .cloned();
            self.dir = matches
                .get_one::<String>(&format!("{service}-directory"))
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from);
        }
        self.config_file = matches
            .get_one::<String>(&format!("{service}-config"))
            .map(PathBuf::from);
        self.disabled = matches.get_flag(&format!("disable-{service}"));
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// `rate-limit-service` -> `RATE_LIMIT_SERVICE_HOME`.
fn home_env_var(service: &str) -> String {
    format!("{}_HOME", service.replace('-', "_").to_uppercase())
}

/// `rate-limit-service` -> `Rate Limit Service`.
fn titleize(service: &str) -> String {
    service
        .split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(flags: &ManagedFlags, args: &[&str]) -> ArgMatches {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        flags.command(Command::new("test")).get_matches_from(argv)
    }

    #[test]
    fn test_full_flag_set() {
        let mut flags = ManagedFlags::for_binary("proxy", "1.21.0");
        let matches = parse(
            &flags,
            &[
                "--proxy-version",
                "1.22.0",
                "--proxy-directory",
                "/opt/proxy",
                "--proxy-config",
                "/etc/proxy.yaml",
            ],
        );
        flags.capture(&matches);

        assert_eq!(flags.version.as_deref(), Some("1.22.0"));
        assert_eq!(flags.dir.as_deref(), Some(std::path::Path::new("/opt/proxy")));
        assert_eq!(
            flags.config_file.as_deref(),
            Some(std::path::Path::new("/etc/proxy.yaml"))
        );
        assert!(!flags.is_disabled());
    }

    #[test]
    fn test_version_defaults() {
        let mut flags = ManagedFlags::for_binary("proxy", "1.21.0");
        let matches = parse(&flags, &[]);
        flags.capture(&matches);
        assert_eq!(flags.version.as_deref(), Some("1.21.0"));
        assert!(flags.config_file.is_none());
    }

    #[test]
    fn test_disable_flag() {
        let mut flags = ManagedFlags::for_binary("proxy", "1.21.0");
        let matches = parse(&flags, &["--disable-proxy"]);
        flags.capture(&matches);
        assert!(flags.is_disabled());
    }

    #[test]
    fn test_directory_defaults_from_environment() {
        temp_env::with_var("PROXY_HOME", Some("/var/cache/proxy"), || {
            let mut flags = ManagedFlags::for_binary("proxy", "1.21.0");
            let matches = parse(&flags, &[]);
            flags.capture(&matches);
            assert_eq!(
                flags.dir.as_deref(),
                Some(std::path::Path::new("/var/cache/proxy"))
            );
        });
    }

    #[test]
    fn test_in_process_registers_no_binary_flags() {
        let flags = ManagedFlags::in_process("xds-service");
        let cmd = flags.command(Command::new("test"));
        let err = cmd
            .try_get_matches_from(["test", "--xds-service-version", "1.0"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_home_env_var() {
        assert_eq!(home_env_var("proxy"), "PROXY_HOME");
        assert_eq!(
            home_env_var("external-auth-service"),
            "EXTERNAL_AUTH_SERVICE_HOME"
        );
    }

    #[test]
    fn test_titleize() {
        assert_eq!(titleize("proxy"), "Proxy");
        assert_eq!(titleize("rate-limit-service"), "Rate Limit Service");
    }
}
