//! Per-endpoint liveness state.
//!
//! Each [`EndpointState`] is written by its one probe slot and the scheduler
//! and read by any number of caller tasks, so every mutable field is an
//! atomic. There is no cross-endpoint locking: records are independent, so
//! no endpoint's bookkeeping can block another's.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::endpoint::EndpointSpec;

/// Millisecond clock anchored at monitor creation.
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    anchor: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }

    /// Monotonic milliseconds since the anchor. Offset by one so a stored 0
    /// always means "never".
    pub(crate) fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64 + 1
    }
}

/// Mutable liveness record for one endpoint.
///
/// Timestamps are milliseconds on the monitor's clock; 0 means the event has
/// never occurred.
pub struct EndpointState {
    spec: EndpointSpec,
    clock: Clock,
    /// Consecutive failures tolerated before the endpoint is declared down.
    retries: u32,
    /// (retries + 2) × check period. A check older than this counts as hung.
    hang_after_ms: u64,
    live: AtomicBool,
    /// True while a probe attempt is in flight.
    checking: AtomicBool,
    /// Completion time of the most recent probe, success or failure.
    last_check_ms: AtomicU64,
    /// Time of the most recent successful probe.
    last_live_ms: AtomicU64,
    failed_checks: AtomicU32,
}

impl EndpointState {
    pub(crate) fn new(
        spec: EndpointSpec,
        clock: Clock,
        retries: u32,
        check_period: Duration,
    ) -> Self {
        Self {
            spec,
            clock,
            retries,
            hang_after_ms: (check_period * (retries + 2)).as_millis() as u64,
            live: AtomicBool::new(false),
            checking: AtomicBool::new(false),
            last_check_ms: AtomicU64::new(0),
            last_live_ms: AtomicU64::new(0),
            failed_checks: AtomicU32::new(0),
        }
    }

    pub fn spec(&self) -> &EndpointSpec {
        &self.spec
    }

    /// Whether the most recently completed check was successful.
    ///
    /// If the endpoint looks live but its probe has been in flight longer
    /// than the hang threshold, the probe is considered stuck and the
    /// endpoint is forced unavailable. That is a safety net against a check
    /// that never returns; the scheduler separately cancels hung probes.
    pub fn is_live(&self) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        if self.checking.load(Ordering::Acquire) {
            let elapsed = self
                .clock
                .now_ms()
                .saturating_sub(self.last_live_ms.load(Ordering::Acquire));
            if elapsed > self.hang_after_ms {
                self.live.store(false, Ordering::Release);
                warn!(
                    endpoint = %self.spec,
                    elapsed_ms = elapsed,
                    "check has not completed within the hang threshold, marking unavailable"
                );
                return false;
            }
        }
        self.live.load(Ordering::Acquire)
    }

    /// Whether no check has completed within the hang threshold.
    pub fn is_hung(&self) -> bool {
        let last = self.last_check_ms.load(Ordering::Acquire);
        self.clock.now_ms().saturating_sub(last) > self.hang_after_ms
    }

    /// Apply a successful probe outcome.
    pub(crate) fn record_success(&self) {
        let now = self.clock.now_ms();
        self.failed_checks.store(0, Ordering::Release);
        self.last_live_ms.store(now, Ordering::Release);
        self.live.store(true, Ordering::Release);
        self.last_check_ms.store(now, Ordering::Release);
    }

    /// Apply a failed probe outcome. The endpoint goes down once the
    /// consecutive-failure count exceeds the retry threshold, so `retries = 0`
    /// means any single failure marks it down.
    pub(crate) fn record_failure(&self) {
        let now = self.clock.now_ms();
        let failed = self.failed_checks.fetch_add(1, Ordering::AcqRel) + 1;
        if failed > self.retries {
            self.live.store(false, Ordering::Release);
        }
        self.last_check_ms.store(now, Ordering::Release);
    }

    pub(crate) fn begin_check(&self) {
        self.checking.store(true, Ordering::Release);
    }

    pub(crate) fn end_check(&self) {
        self.checking.store(false, Ordering::Release);
    }

    /// Whether a probe attempt is currently in flight.
    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    /// Consecutive failures since the last success.
    pub fn failed_checks(&self) -> u32 {
        self.failed_checks.load(Ordering::Acquire)
    }

    /// Completion time of the most recent check on the monitor's clock, in
    /// milliseconds; 0 before the first check completes.
    pub fn last_check_ms(&self) -> u64 {
        self.last_check_ms.load(Ordering::Acquire)
    }

    /// Time of the most recent successful check; 0 before the first success.
    pub fn last_live_ms(&self) -> u64 {
        self.last_live_ms.load(Ordering::Acquire)
    }
}

impl fmt::Debug for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointState")
            .field("endpoint", &self.spec.to_string())
            .field("live", &self.live.load(Ordering::Acquire))
            .field("checking", &self.is_checking())
            .field("failed_checks", &self.failed_checks())
            .field("last_check_ms", &self.last_check_ms())
            .field("last_live_ms", &self.last_live_ms())
            .finish()
    }
}
