//! Host tick loop.
//!
//! Stands in for a frame loop: the binary calls [`run_until`] with a step
//! closure that ticks its agents once per interval.
//!
//! # Design
//!
//! Functions in this module are regular functions (M-REGULAR-FN) rather than
//! methods on an agent, making them independently testable.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::agent::Agent;

/// Tick every agent once. Returns the total number of messages delivered.
pub fn tick_all(agents: &mut [&mut dyn Agent]) -> usize {
    agents.iter_mut().map(|agent| agent.tick()).sum()
}

/// Shut every agent down.
pub fn shutdown_all(agents: &mut [&mut dyn Agent]) {
    for agent in agents.iter_mut() {
        log::debug!("Shutting down {} agent", agent.role());
        agent.shutdown();
    }
}

/// Call `step` once per `interval` until it breaks or `shutdown` is set.
///
/// The sleep accounts for the time `step` took, so a slow step does not
/// stretch the interval.
pub fn run_until(
    shutdown: &AtomicBool,
    interval: Duration,
    mut step: impl FnMut() -> ControlFlow<()>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let started = Instant::now();
        if step().is_break() {
            break;
        }
        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
