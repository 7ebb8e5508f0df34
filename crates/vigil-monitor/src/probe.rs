//! Liveness probes — one long-lived, cancellable slot per endpoint.
//!
//! A [`ProbeSlot`] is created once at monitor startup and re-armed each
//! period rather than re-allocated, so the in-flight flag stays visible
//! across periods. Probes carry no timeout of their own; a probe that never
//! returns is detected and cancelled by the scheduler through the hang
//! threshold.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Empty;
use tokio::net::TcpStream;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::endpoint::{EndpointSpec, Target};
use crate::state::EndpointState;

/// Result of a single probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Probe one endpoint once.
///
/// HTTP targets are fetched with a GET and succeed only on an exact 200
/// status. TCP targets succeed when a bare connect establishes; no bytes are
/// exchanged. Every network error is a failure outcome, never an error to
/// the caller.
pub async fn probe_once(spec: &EndpointSpec) -> ProbeOutcome {
    match spec.target() {
        Target::Tcp(_) => match TcpStream::connect(spec.probe_addr()).await {
            Ok(_) => ProbeOutcome::Success,
            Err(e) => {
                debug!(endpoint = %spec, error = %e, "tcp probe failed");
                ProbeOutcome::Failure
            }
        },
        Target::Http(uri) => http_probe(spec, uri).await,
    }
}

async fn http_probe(spec: &EndpointSpec, uri: &http::Uri) -> ProbeOutcome {
    let stream = match TcpStream::connect(spec.probe_addr()).await {
        Ok(s) => s,
        Err(e) => {
            debug!(endpoint = %spec, error = %e, "http probe connection failed");
            return ProbeOutcome::Failure;
        }
    };

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(endpoint = %spec, error = %e, "http probe handshake failed");
            return ProbeOutcome::Failure;
        }
    };

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", spec.probe_addr())
        .header("user-agent", "vigil/0.1")
        .body(Empty::<Bytes>::new())
        .unwrap();

    match sender.send_request(req).await {
        Ok(resp) if resp.status() == http::StatusCode::OK => ProbeOutcome::Success,
        Ok(resp) => {
            debug!(endpoint = %spec, status = %resp.status(), "http probe non-200");
            ProbeOutcome::Failure
        }
        Err(e) => {
            debug!(endpoint = %spec, error = %e, "http probe request failed");
            ProbeOutcome::Failure
        }
    }
}

/// The long-lived probe task for one endpoint.
///
/// The task idles until armed, runs exactly one probe attempt, applies the
/// outcome to the shared [`EndpointState`], and idles again. Cancellation
/// drops the in-flight attempt, which unblocks a pending connect or read; a
/// cancelled attempt records neither success nor failure, leaving the
/// endpoint on the scheduler's hang-handling path.
pub(crate) struct ProbeSlot {
    state: Arc<EndpointState>,
    arm: Arc<Notify>,
    cancel_tx: watch::Sender<u64>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProbeSlot {
    pub(crate) fn spawn(state: Arc<EndpointState>) -> Self {
        let arm = Arc::new(Notify::new());
        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_slot(state.clone(), arm.clone(), cancel_rx, shutdown_rx));
        Self {
            state,
            arm,
            cancel_tx,
            shutdown_tx,
            handle,
        }
    }

    /// Wake the slot for one probe attempt.
    ///
    /// A dead slot task while the monitor is running is an invariant
    /// violation; the same condition during shutdown is expected and
    /// ignored.
    pub(crate) fn arm(&self, running: bool) {
        if self.handle.is_finished() {
            if running {
                error!(
                    endpoint = %self.state.spec(),
                    "probe slot task exited while the monitor is running"
                );
            }
            return;
        }
        self.arm.notify_one();
    }

    /// Interrupt the in-flight attempt, if any.
    pub(crate) fn cancel(&self) {
        self.cancel_tx.send_modify(|n| *n += 1);
    }

    /// Stop the slot task. Abrupt: an in-flight attempt is dropped, not
    /// drained.
    pub(crate) fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

async fn run_slot(
    state: Arc<EndpointState>,
    arm: Arc<Notify>,
    mut cancel_rx: watch::Receiver<u64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = arm.notified() => {}
            _ = shutdown_rx.changed() => break,
        }

        state.begin_check();
        // Discard any cancellation aimed at a previous attempt.
        cancel_rx.mark_unchanged();
        tokio::select! {
            outcome = probe_once(state.spec()) => match outcome {
                ProbeOutcome::Success => state.record_success(),
                ProbeOutcome::Failure => state.record_failure(),
            },
            _ = cancel_rx.changed() => {
                debug!(endpoint = %state.spec(), "in-flight probe cancelled");
            }
            _ = shutdown_rx.changed() => {
                state.end_check();
                break;
            }
        }
        state.end_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Clock;
    use std::time::Duration;

    fn tcp_state(port: u16) -> Arc<EndpointState> {
        let spec = EndpointSpec::resolve("127.0.0.1", port).unwrap();
        Arc::new(EndpointState::new(
            spec,
            Clock::new(),
            0,
            Duration::from_millis(50),
        ))
    }

    #[tokio::test]
    async fn tcp_probe_to_closed_port_fails() {
        // Port 1 is essentially never listening.
        let spec = EndpointSpec::resolve("127.0.0.1", 1).unwrap();
        assert_eq!(probe_once(&spec).await, ProbeOutcome::Failure);
    }

    #[tokio::test]
    async fn tcp_probe_to_listening_port_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let spec = EndpointSpec::resolve("127.0.0.1", port).unwrap();
        assert_eq!(probe_once(&spec).await, ProbeOutcome::Success);
    }

    #[tokio::test]
    async fn http_probe_to_closed_port_fails() {
        let spec = EndpointSpec::from_url("http://127.0.0.1:1/healthz").unwrap();
        assert_eq!(probe_once(&spec).await, ProbeOutcome::Failure);
    }

    #[tokio::test]
    async fn slot_applies_outcome_when_armed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = tcp_state(port);
        let slot = ProbeSlot::spawn(state.clone());

        assert!(!state.is_live());
        slot.arm(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.is_live());
        assert_eq!(state.failed_checks(), 0);

        slot.shutdown();
    }

    #[tokio::test]
    async fn cancel_interrupts_blocked_probe_without_outcome() {
        // An HTTP target that accepts but never responds keeps the probe in
        // flight indefinitely.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    held.push(stream);
                }
            }
        });

        let spec = EndpointSpec::from_url(&format!("http://127.0.0.1:{port}/")).unwrap();
        let state = Arc::new(EndpointState::new(
            spec,
            Clock::new(),
            0,
            Duration::from_millis(50),
        ));
        let slot = ProbeSlot::spawn(state.clone());

        slot.arm(true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.is_checking());

        slot.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!state.is_checking());
        // No outcome was recorded.
        assert_eq!(state.last_check_ms(), 0);
        assert_eq!(state.failed_checks(), 0);

        slot.shutdown();
        silent.abort();
    }

    #[tokio::test]
    async fn arm_after_shutdown_is_swallowed() {
        let state = tcp_state(1);
        let slot = ProbeSlot::spawn(state);
        slot.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Must not panic; the monitor is no longer running.
        slot.arm(false);
    }
}
