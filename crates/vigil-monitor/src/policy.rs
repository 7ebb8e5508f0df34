//! Selection policies — choosing one live endpoint for a caller.
//!
//! Selection runs on arbitrary caller tasks, concurrently with the scheduler
//! and the probe slots. The round-robin cursor is a shared atomic counter;
//! no two callers observe the same pre-advance value.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::state::EndpointState;

/// How a live endpoint is chosen from the ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// The first live endpoint in list order.
    FirstLive,
    /// Live endpoints in rotation, advancing a shared cursor.
    RoundRobin,
    /// A uniformly random live endpoint.
    Random,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-live" => Ok(Self::FirstLive),
            "round-robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(format!(
                "unknown policy {other:?} (expected first-live, round-robin, or random)"
            )),
        }
    }
}

/// Apply a policy once over the ordered endpoint list.
///
/// Returns `None` when no live endpoint is found; never an error.
pub(crate) fn select(
    policy: SelectionPolicy,
    endpoints: &[Arc<EndpointState>],
    cursor: &AtomicUsize,
    live_count: &AtomicUsize,
) -> Option<Arc<EndpointState>> {
    if endpoints.is_empty() {
        return None;
    }
    match policy {
        SelectionPolicy::FirstLive => endpoints.iter().find(|s| s.is_live()).cloned(),
        SelectionPolicy::RoundRobin => {
            for _ in 0..endpoints.len() {
                let n = cursor.fetch_add(1, Ordering::Relaxed);
                let state = &endpoints[n % endpoints.len()];
                if state.is_live() {
                    return Some(state.clone());
                }
            }
            None
        }
        SelectionPolicy::Random => {
            let mut rng = rand::thread_rng();
            while live_count.load(Ordering::Acquire) > 0 {
                let state = &endpoints[rng.gen_range(0..endpoints.len())];
                if state.is_live() {
                    return Some(state.clone());
                }
            }
            None
        }
    }
}
