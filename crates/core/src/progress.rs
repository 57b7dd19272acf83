//! Progress estimation for long-running generation jobs.
//!
//! Most upstream services report no usable progress while a job runs,
//! so the poller synthesizes a slowly advancing estimate from the
//! attempt count. When the upstream does report a fractional progress
//! that beats the estimate, the larger value wins. The reported value
//! never decreases.

/// Starting percentage shown as soon as polling begins.
const SIMULATED_BASE: f64 = 10.0;
/// Ceiling of the synthesized estimate; the remaining headroom is only
/// reachable through real upstream progress or completion.
const SIMULATED_CAP: f64 = 85.0;
/// Upstream-reported progress is capped just below done.
const UPSTREAM_CAP: f64 = 99.0;

/// Synthesized progress for `attempt` of `max_attempts`:
/// `min(cap, base + attempt/max * range)`.
pub fn simulated_progress(attempt: u32, max_attempts: u32) -> f64 {
    if max_attempts == 0 {
        return SIMULATED_BASE;
    }
    let range = SIMULATED_CAP - SIMULATED_BASE;
    let estimate = SIMULATED_BASE + (attempt as f64 / max_attempts as f64) * range;
    estimate.min(SIMULATED_CAP)
}

/// Monotone progress tracker for one job.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: f64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the simulated estimate and an optional upstream fraction
    /// (0.0–1.0), returning the value to report. Never decreases.
    pub fn update(&mut self, attempt: u32, max_attempts: u32, upstream_fraction: Option<f64>) -> f64 {
        let simulated = simulated_progress(attempt, max_attempts);
        let upstream = upstream_fraction
            .map(|f| (f * 100.0).clamp(0.0, UPSTREAM_CAP))
            .unwrap_or(0.0);
        let candidate = simulated.max(upstream);
        if candidate > self.last {
            self.last = candidate;
        }
        self.last
    }

    /// Jump to 100 on terminal success.
    pub fn complete(&mut self) -> f64 {
        self.last = 100.0;
        self.last
    }

    pub fn current(&self) -> f64 {
        self.last
    }
}
