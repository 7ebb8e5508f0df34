//! End-to-end monitor behavior against synthetic servers.

use std::sync::Arc;
use std::time::Duration;

use vigil_mock::{MockServer, Mode};
use vigil_monitor::{EndpointSpec, EndpointState, Monitor, MonitorConfig, SelectionPolicy};

const PERIOD: Duration = Duration::from_millis(50);

fn config(policy: SelectionPolicy) -> MonitorConfig {
    MonitorConfig {
        name: "test".to_string(),
        policy,
        check_period: PERIOD,
        retries: 0,
    }
}

async fn servers(count: usize) -> Vec<MockServer> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(MockServer::start(0).await.unwrap());
    }
    out
}

fn tcp_specs(servers: &[MockServer]) -> Vec<EndpointSpec> {
    servers
        .iter()
        .map(|s| EndpointSpec::resolve("127.0.0.1", s.port()).unwrap())
        .collect()
}

fn is_endpoint(picked: &Arc<EndpointState>, monitor: &Monitor, index: usize) -> bool {
    Arc::ptr_eq(picked, &monitor.endpoints()[index])
}

#[tokio::test]
async fn first_live_fails_over_and_recovers() {
    let servers = servers(3).await;
    let monitor = Monitor::start(config(SelectionPolicy::FirstLive), tcp_specs(&servers));

    // Warm-up: select_live blocks until the first probe round lands.
    let picked = monitor.select_live().await.expect("all servers are up");
    assert!(is_endpoint(&picked, &monitor, 0));

    // Endpoint 0 goes dark; the next selection moves to endpoint 1 within
    // one check period of the failed probe.
    servers[0].set_mode(Mode::Down);
    tokio::time::sleep(4 * PERIOD).await;
    let picked = monitor.select_live().await.expect("endpoints 1 and 2 are up");
    assert!(is_endpoint(&picked, &monitor, 1));

    // Restoring endpoint 0 makes it preferred again.
    servers[0].set_mode(Mode::Up);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let picked = monitor.select_live().await.expect("all servers are up");
    assert!(is_endpoint(&picked, &monitor, 0));

    monitor.close().await;
}

#[tokio::test]
async fn round_robin_returns_endpoints_in_list_order() {
    let servers = servers(3).await;
    let monitor = Monitor::start(config(SelectionPolicy::RoundRobin), tcp_specs(&servers));

    let first = monitor.select_live().await.expect("all servers are up");
    let second = monitor.select_live().await.expect("all servers are up");
    assert!(is_endpoint(&first, &monitor, 0));
    assert!(is_endpoint(&second, &monitor, 1));

    monitor.close().await;
}

#[tokio::test]
async fn warm_up_blocks_until_first_round() {
    let servers = servers(1).await;
    let monitor = Monitor::start(config(SelectionPolicy::FirstLive), tcp_specs(&servers));

    // Called immediately, before any probe has completed: warm-up retries
    // inside select_live rather than reporting a miss.
    assert!(monitor.select_live().await.is_some());
    monitor.close().await;
}

#[tokio::test]
async fn hung_endpoint_is_excluded_and_recovers() {
    let server = MockServer::start(0).await.unwrap();
    let spec = EndpointSpec::from_url(&format!("http://127.0.0.1:{}/", server.port())).unwrap();
    let monitor = Monitor::start(config(SelectionPolicy::FirstLive), vec![spec]);

    assert!(monitor.select_live().await.is_some());

    // The server now accepts and never responds, so probes block in flight.
    // With retries=0 the hang threshold is 2 × period: past it the endpoint
    // is forced unavailable and its probe gets cancelled by the scheduler.
    server.set_mode(Mode::Hang);
    tokio::time::sleep(8 * PERIOD).await;
    assert!(monitor.select_live().await.is_none());
    assert!(!monitor.endpoints()[0].is_live());

    // Once the server responds again, the re-armed probe restores liveness.
    server.set_mode(Mode::Up);
    tokio::time::sleep(6 * PERIOD).await;
    assert!(monitor.select_live().await.is_some());

    monitor.close().await;
}

#[tokio::test]
async fn error_status_counts_as_failure() {
    let server = MockServer::start(0).await.unwrap();
    let spec = EndpointSpec::from_url(&format!("http://127.0.0.1:{}/", server.port())).unwrap();
    let monitor = Monitor::start(config(SelectionPolicy::FirstLive), vec![spec]);

    assert!(monitor.select_live().await.is_some());

    // A 500 answer is a completed-but-failed check, not a hang.
    server.set_mode(Mode::Error);
    tokio::time::sleep(4 * PERIOD).await;
    assert!(monitor.select_live().await.is_none());
    assert!(monitor.endpoints()[0].failed_checks() >= 1);

    monitor.close().await;
}

#[tokio::test]
async fn random_policy_selects_only_live_endpoints() {
    let servers = servers(2).await;
    servers[1].set_mode(Mode::Down);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let monitor = Monitor::start(config(SelectionPolicy::Random), tcp_specs(&servers));
    for _ in 0..10 {
        let picked = monitor.select_live().await.expect("endpoint 0 is up");
        assert!(is_endpoint(&picked, &monitor, 0));
    }
    monitor.close().await;
}

#[tokio::test]
async fn closed_monitor_never_blocks_on_selection() {
    // An endpoint that never comes up, closed during the warm-up window.
    let spec = EndpointSpec::resolve("127.0.0.1", 1).unwrap();
    let monitor = Monitor::start(config(SelectionPolicy::FirstLive), vec![spec]);
    monitor.close().await;

    // Still inside 2 × period of creation, but a closed monitor must not
    // sleep through warm-up retries.
    let start = std::time::Instant::now();
    assert!(monitor.select_live().await.is_none());
    assert!(start.elapsed() < PERIOD);
}
