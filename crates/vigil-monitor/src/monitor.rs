//! The monitor — endpoint arena, scheduler loop, and selection entry point.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::endpoint::EndpointSpec;
use crate::event::{EventListener, ListenerRegistry, LivenessEvent, Severity};
use crate::policy::{self, SelectionPolicy};
use crate::probe::ProbeSlot;
use crate::state::{Clock, EndpointState};

/// How often an unchanged liveness summary is re-logged.
const HEARTBEAT: Duration = Duration::from_secs(60);

/// Monitor construction options.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Label displayed with all log entries and events from this monitor.
    pub name: String,
    pub policy: SelectionPolicy,
    /// How often every endpoint is re-checked.
    pub check_period: Duration,
    /// Consecutive failures tolerated before an endpoint is declared down.
    /// 0 means any single failure marks it down.
    pub retries: u32,
}

/// Monitors a fixed, ordered set of endpoints.
///
/// All endpoints start unavailable; true status is known no later than one
/// check period after startup. List order is significant: it is the priority
/// order for first-live selection and the rotation order for round-robin.
///
/// Cheaply cloneable; all clones share the same monitor.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Shared>,
}

struct Shared {
    config: MonitorConfig,
    clock: Clock,
    /// Used to suppress false all-down alarms during warm-up.
    started_ms: u64,
    endpoints: Vec<Arc<EndpointState>>,
    slots: Vec<ProbeSlot>,
    /// Round-robin cursor, contended from any number of caller tasks.
    cursor: AtomicUsize,
    /// Live count as of the last scheduler sweep.
    live_count: AtomicUsize,
    running: AtomicBool,
    listeners: ListenerRegistry,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Build the endpoint arena and probe slots and start the scheduler.
    ///
    /// Must be called from within a tokio runtime. The check period must be
    /// nonzero.
    pub fn start(config: MonitorConfig, specs: Vec<EndpointSpec>) -> Self {
        assert!(
            !config.check_period.is_zero(),
            "check period must be nonzero"
        );
        assert!(!specs.is_empty(), "endpoint list must be nonempty");

        let clock = Clock::new();
        let endpoints: Vec<Arc<EndpointState>> = specs
            .into_iter()
            .map(|spec| {
                Arc::new(EndpointState::new(
                    spec,
                    clock.clone(),
                    config.retries,
                    config.check_period,
                ))
            })
            .collect();
        let slots: Vec<ProbeSlot> = endpoints.iter().map(|s| ProbeSlot::spawn(s.clone())).collect();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let started_ms = clock.now_ms();
        let inner = Arc::new(Shared {
            clock,
            started_ms,
            endpoints,
            slots,
            cursor: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            listeners: ListenerRegistry::new(),
            shutdown_tx,
            scheduler: Mutex::new(None),
            config,
        });

        let handle = tokio::spawn(run_scheduler(inner.clone(), shutdown_rx));
        *inner.scheduler.lock().expect("scheduler lock") = Some(handle);

        info!(
            monitor = %inner.config.name,
            endpoints = inner.endpoints.len(),
            period_ms = inner.config.check_period.as_millis() as u64,
            retries = inner.config.retries,
            "monitor started"
        );
        Monitor { inner }
    }

    /// Register a listener for liveness events. Listeners run synchronously
    /// on the scheduler task and must not block.
    pub fn register_listener(&self, listener: EventListener) {
        self.inner.listeners.register(listener);
    }

    /// The ordered endpoint records, as supplied at construction.
    pub fn endpoints(&self) -> &[Arc<EndpointState>] {
        &self.inner.endpoints
    }

    /// Live count as of the last scheduler sweep.
    pub fn live_count(&self) -> usize {
        self.inner.live_count.load(Ordering::Acquire)
    }

    /// Select a live endpoint according to the configured policy.
    ///
    /// Returns `None` when no endpoint is live. Within the first two check
    /// periods of the monitor's lifetime a miss sleeps one period and
    /// retries, smoothing over the warm-up window before the first probe
    /// round completes; beyond that window a miss returns immediately.
    pub async fn select_live(&self) -> Option<Arc<EndpointState>> {
        let period_ms = self.inner.config.check_period.as_millis() as u64;
        loop {
            let picked = policy::select(
                self.inner.config.policy,
                &self.inner.endpoints,
                &self.inner.cursor,
                &self.inner.live_count,
            );
            if picked.is_some() {
                return picked;
            }
            if !self.inner.running.load(Ordering::Acquire) {
                return None;
            }
            let since_start = self.inner.clock.now_ms().saturating_sub(self.inner.started_ms);
            if since_start >= 2 * period_ms {
                return None;
            }
            tokio::time::sleep(self.inner.config.check_period).await;
        }
    }

    /// Release all resources held by this monitor. Irreversible: the
    /// instance is unusable afterwards and in-flight probes are cancelled,
    /// not drained. May block up to roughly two check periods.
    pub async fn close(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(true);
        for slot in &self.inner.slots {
            slot.shutdown();
        }

        let handle = self.inner.scheduler.lock().expect("scheduler lock").take();
        if let Some(handle) = handle {
            let _ =
                tokio::time::timeout(2 * self.inner.config.check_period, handle).await;
        }
        info!(monitor = %self.inner.config.name, "monitor closed");
    }
}

/// Per-sweep bookkeeping for event throttling.
struct SweepLog {
    last_lives: Option<usize>,
    last_listeners: usize,
    last_logged_ms: u64,
    rounds: u64,
}

async fn run_scheduler(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(shared.config.check_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut log = SweepLog {
        last_lives: None,
        last_listeners: 0,
        last_logged_ms: shared.clock.now_ms(),
        rounds: 0,
    };

    while shared.running.load(Ordering::Acquire) {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        sweep(&shared, &mut log);
    }
    debug!(monitor = %shared.config.name, "scheduler stopped");
}

/// One scheduler round: tally liveness, cancel hung probes, re-arm idle
/// slots, and publish a liveness event when warranted.
fn sweep(shared: &Shared, log: &mut SweepLog) {
    let mut lives = 0usize;
    let mut down: Vec<String> = Vec::new();

    for (state, slot) in shared.endpoints.iter().zip(&shared.slots) {
        if state.is_live() {
            lives += 1;
        } else {
            let hung = state.is_hung();
            if hung {
                // Request interruption before the slot is re-armed.
                slot.cancel();
            }
            down.push(if hung {
                format!("{}(hung)", state.spec())
            } else {
                state.spec().to_string()
            });
        }
        // Idempotent resubmission: a slot already mid-probe is left alone.
        // The running flag is re-read per slot so a close landing mid-sweep
        // is seen as shutdown, not as a dead-slot invariant violation.
        if !state.is_checking() {
            slot.arm(shared.running.load(Ordering::Acquire));
        }
    }
    shared.live_count.store(lives, Ordering::Release);
    log.rounds += 1;

    let now = shared.clock.now_ms();
    let listeners = shared.listeners.len();
    let changed = log.last_lives != Some(lives) || log.last_listeners != listeners;
    let heartbeat =
        now.saturating_sub(log.last_logged_ms) > HEARTBEAT.as_millis() as u64;
    if !changed && !heartbeat {
        return;
    }

    let event = build_event(shared, lives, &down, now);
    match event.severity {
        Severity::Error => error!(monitor = %shared.config.name, "{}", event.message),
        Severity::Warn => warn!(monitor = %shared.config.name, "{}", event.message),
        Severity::Info => {
            info!(monitor = %shared.config.name, rounds = log.rounds, "{}", event.message)
        }
    }

    // The heartbeat alone re-logs the summary but does not re-notify.
    if changed {
        shared.listeners.notify(&event);
    }

    log.last_lives = Some(lives);
    log.last_listeners = listeners;
    log.last_logged_ms = now;
    log.rounds = 0;
}

fn build_event(shared: &Shared, lives: usize, down: &[String], now: u64) -> LivenessEvent {
    let name = &shared.config.name;
    let total = shared.endpoints.len();
    let period_ms = shared.config.check_period.as_millis() as u64;

    let (severity, message) = if lives == 0 {
        let message = format!(
            "[{name}] All {total} endpoints are unavailable: {}",
            down.join(" ")
        );
        // Within the first check period nothing has been probed yet, so an
        // all-down report would be a false alarm.
        if now.saturating_sub(shared.started_ms) < period_ms {
            (Severity::Info, message)
        } else {
            (Severity::Error, message)
        }
    } else if lives < total {
        (
            Severity::Warn,
            format!(
                "[{name}] {} out of {total} endpoints are unavailable: {}",
                total - lives,
                down.join(" ")
            ),
        )
    } else {
        (
            Severity::Info,
            format!("[{name}] All endpoints are up. (period={period_ms}ms)"),
        )
    };

    LivenessEvent {
        monitor: name.clone(),
        live_count: lives,
        total,
        severity,
        message,
    }
}
