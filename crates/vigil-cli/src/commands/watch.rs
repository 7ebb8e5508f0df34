//! The `watch` command — assemble an endpoint list from argv and keep
//! printing the selected live endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{error, info, warn};

use vigil_monitor::{
    EndpointSpec, LivenessEvent, Monitor, MonitorConfig, SelectionPolicy, Severity,
};

pub async fn run(
    targets: Vec<String>,
    policy: &str,
    period_ms: u64,
    retries: u32,
    print_interval: u64,
) -> anyhow::Result<()> {
    let policy: SelectionPolicy = policy.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    // All-or-nothing: a single bad target aborts before monitoring starts.
    let mut specs = Vec::with_capacity(targets.len());
    for target in &targets {
        specs.push(parse_target(target)?);
    }

    let monitor = Monitor::start(
        MonitorConfig {
            name: "watch".to_string(),
            policy,
            check_period: Duration::from_millis(period_ms),
            retries,
        },
        specs,
    );

    monitor.register_listener(Arc::new(|event: &LivenessEvent| match event.severity {
        Severity::Error => error!("watch: {}", event.message),
        Severity::Warn => warn!("watch: {}", event.message),
        Severity::Info => info!("watch: {}", event.message),
    }));

    loop {
        match monitor.select_live().await {
            Some(state) => info!("watch: endpoint {} is live", state.spec()),
            None => info!("watch: no live endpoints"),
        }
        tokio::time::sleep(Duration::from_secs(print_interval)).await;
    }
}

/// Parse one target argument: bare digits mean a port on localhost,
/// `http(s)://…` is an HTTP endpoint, and `host:port` is a raw TCP one.
fn parse_target(target: &str) -> anyhow::Result<EndpointSpec> {
    if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
        let port: u16 = target
            .parse()
            .with_context(|| format!("port out of range: {target}"))?;
        return Ok(EndpointSpec::resolve("localhost", port)?);
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(EndpointSpec::from_url(target)?);
    }
    if let Some((host, port)) = target.rsplit_once(':') {
        if !host.is_empty() {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in target {target:?}"))?;
            return Ok(EndpointSpec::resolve(host, port)?);
        }
    }
    bail!("invalid target {target:?} (expected host:port, http(s)://…, or a bare port)")
}
