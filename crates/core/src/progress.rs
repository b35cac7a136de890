//! Progress estimation for in-flight generation jobs.
//!
//! The remote service does not report fine-grained progress while a job is
//! running, so the queue estimates it from elapsed wall-clock time against
//! a nominal expected duration, capped below 100 until the job actually
//! succeeds.

/// Estimated progress never exceeds this while the job is still running.
pub const PROGRESS_CAP: u8 = 95;

/// Nominal end-to-end duration of a generation job, in seconds.
pub const EXPECTED_DURATION_SECS: i64 = 120;

/// Minimum change, in points, before a new estimate is worth surfacing.
pub const REFRESH_THRESHOLD: u8 = 5;

/// Estimate progress in `0..=95` from the job's remote creation time.
///
/// `min(95, elapsed_secs / 120 * 100)`. A clock skew that makes `now`
/// earlier than `created_at_unix` clamps to zero.
pub fn estimate(created_at_unix: i64, now_unix: i64) -> u8 {
    let elapsed = (now_unix - created_at_unix).max(0);
    let pct = elapsed * 100 / EXPECTED_DURATION_SECS;
    pct.min(PROGRESS_CAP as i64) as u8
}

/// Whether a new estimate differs enough from the previous one to commit.
///
/// Updating the stored progress on every sweep causes redundant observer
/// churn; only deltas above [`REFRESH_THRESHOLD`] (or a first estimate)
/// are surfaced.
pub fn should_refresh(previous: Option<u8>, next: u8) -> bool {
    match previous {
        None => true,
        Some(prev) => next.abs_diff(prev) > REFRESH_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_near_zero() {
        assert_eq!(estimate(1_000, 1_000), 0);
        assert_eq!(estimate(1_000, 1_006), 5);
    }

    #[test]
    fn caps_at_95() {
        assert_eq!(estimate(0, EXPECTED_DURATION_SECS), PROGRESS_CAP);
        assert_eq!(estimate(0, 100 * EXPECTED_DURATION_SECS), PROGRESS_CAP);
    }

    #[test]
    fn clock_skew_clamps_to_zero() {
        assert_eq!(estimate(2_000, 1_000), 0);
    }

    #[test]
    fn monotonic_over_time() {
        let mut last = 0;
        for now in (0..600).step_by(7) {
            let p = estimate(0, now);
            assert!(p >= last, "estimate regressed at t={now}");
            last = p;
        }
    }

    #[test]
    fn refresh_hysteresis() {
        assert!(should_refresh(None, 0));
        assert!(!should_refresh(Some(50), 53));
        assert!(!should_refresh(Some(50), 55));
        assert!(should_refresh(Some(50), 56));
        assert!(should_refresh(Some(50), 44));
    }
}
