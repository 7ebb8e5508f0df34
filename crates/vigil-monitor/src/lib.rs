//! vigil-monitor — embedded endpoint liveness monitoring.
//!
//! Monitors a fixed set of network endpoints (HTTP URLs or raw host:port
//! targets) on a fixed period and hands callers a currently-live endpoint
//! chosen by a pluggable selection policy. Intended to be embedded in a
//! client that must route traffic away from failed backends without an
//! external load balancer.
//!
//! # Architecture
//!
//! A [`Monitor`] owns one [`EndpointState`] record per endpoint plus one
//! long-lived, cancellable probe task per endpoint (so no slow endpoint can
//! queue behind another). A single scheduler task wakes once per check
//! period, re-arms idle probes, cancels hung ones, recomputes the aggregate
//! live count, and fans out [`LivenessEvent`]s to registered listeners.
//!
//! Selection runs on arbitrary caller tasks and never serializes behind the
//! scheduler: all shared per-endpoint fields are atomics.

pub mod endpoint;
pub mod event;
pub mod monitor;
pub mod policy;
pub mod probe;
pub mod state;

pub use endpoint::{EndpointError, EndpointSpec, Target};
pub use event::{EventListener, LivenessEvent, Severity};
pub use monitor::{Monitor, MonitorConfig};
pub use policy::SelectionPolicy;
pub use probe::ProbeOutcome;
pub use state::EndpointState;
