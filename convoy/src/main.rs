// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::Result;
use convoy::Group;
use convoy::services::extauthz::ExtAuthzService;
use convoy::services::proxy::ProxyService;
use convoy::services::ratelimit::RateLimitService;
use convoy::services::xds::XdsService;
use log::error;

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let mut group = Group::new("convoy");
    group.register(XdsService::new(None));
    group.register(ExtAuthzService::new(None));
    group.register(RateLimitService::new(None));
    group.register(ProxyService::new(None));

    if let Err(e) = group.run().await {
        error!("program exit: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
