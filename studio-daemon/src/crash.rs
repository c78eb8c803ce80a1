//! Crash accounting for the supervised daemon

use std::time::Duration;
use tokio::time::Instant;

/// Consecutive unexpected exits of the daemon
#[derive(Debug, Clone, Default)]
pub struct CrashState {
    consecutive_crashes: u32,
    last_crash: Option<Instant>,
}

impl CrashState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unexpected exit at `now` and return the updated count.
    ///
    /// If more than `stability_window` passed since the previous crash the
    /// daemon is considered to have been healthy and counting starts over.
    pub fn record_crash(&mut self, now: Instant, stability_window: Duration) -> u32 {
        if let Some(last) = self.last_crash {
            if now.saturating_duration_since(last) > stability_window {
                self.consecutive_crashes = 0;
            }
        }

        self.consecutive_crashes = self.consecutive_crashes.saturating_add(1);
        self.last_crash = Some(now);
        self.consecutive_crashes
    }

    /// Count as observed at `now`: zero once the daemon has outlived the
    /// stability window since its last crash
    pub fn consecutive_crashes(&self, now: Instant, stability_window: Duration) -> u32 {
        match self.last_crash {
            Some(last) if now.saturating_duration_since(last) > stability_window => 0,
            _ => self.consecutive_crashes,
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_crashes = 0;
        self.last_crash = None;
    }

    /// Count as of the last recorded crash, ignoring the window
    pub fn recorded_crashes(&self) -> u32 {
        self.consecutive_crashes
    }

    pub fn last_crash(&self) -> Option<Instant> {
        self.last_crash
    }
}

/// `min(base * 2^(crashes - 1), cap)`: 1s, 2s, 4s, 8s... with a 1s base
pub fn restart_delay(crashes: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = crashes.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |delay| delay.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_crashes_accumulate_inside_window() {
        let start = Instant::now();
        let mut state = CrashState::new();

        assert_eq!(state.record_crash(start, WINDOW), 1);
        assert_eq!(state.record_crash(start + Duration::from_secs(10), WINDOW), 2);
        assert_eq!(state.record_crash(start + Duration::from_secs(20), WINDOW), 3);
        assert_eq!(state.last_crash(), Some(start + Duration::from_secs(20)));
    }

    #[test]
    fn test_count_restarts_after_stable_period() {
        let start = Instant::now();
        let mut state = CrashState::new();

        state.record_crash(start, WINDOW);
        state.record_crash(start + Duration::from_secs(1), WINDOW);
        let later = start + Duration::from_secs(1) + WINDOW + Duration::from_secs(1);

        assert_eq!(state.record_crash(later, WINDOW), 1);
    }

    #[test]
    fn test_window_boundary_still_counts() {
        let start = Instant::now();
        let mut state = CrashState::new();

        state.record_crash(start, WINDOW);
        assert_eq!(state.record_crash(start + WINDOW, WINDOW), 2);
    }

    #[test]
    fn test_observed_count_decays_without_new_crash() {
        let start = Instant::now();
        let mut state = CrashState::new();

        state.record_crash(start, WINDOW);
        state.record_crash(start + Duration::from_secs(5), WINDOW);

        assert_eq!(state.consecutive_crashes(start + Duration::from_secs(5) + WINDOW, WINDOW), 2);
        let healthy = start + Duration::from_secs(6) + WINDOW;
        assert_eq!(state.consecutive_crashes(healthy, WINDOW), 0);
        assert_eq!(state.recorded_crashes(), 2);
    }

    #[test]
    fn test_reset() {
        let mut state = CrashState::new();
        state.record_crash(Instant::now(), WINDOW);
        state.reset();

        assert_eq!(state.recorded_crashes(), 0);
        assert!(state.last_crash().is_none());
    }

    #[test]
    fn test_restart_delay_doubles_up_to_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);

        let delays: Vec<u64> = (1..=7)
            .map(|n| restart_delay(n, base, cap).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        assert_eq!(restart_delay(0, base, cap), base);
        assert_eq!(restart_delay(u32::MAX, base, cap), cap);
    }
}
