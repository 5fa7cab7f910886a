//! Time utilities for reaction timing

use std::time::Duration;
use tokio::time::Instant;

/// Signed milliseconds from `origin` to `at`.
///
/// Negative when `at` precedes `origin`, which is how a press before the
/// go signal shows up.
pub fn signed_millis(origin: Instant, at: Instant) -> i64 {
    if at >= origin {
        at.duration_since(origin).as_millis() as i64
    } else {
        -(origin.duration_since(at).as_millis() as i64)
    }
}

/// Format a duration as `mm:ss`
pub fn format_mm_ss(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Lights shown during the countdown
pub const COUNTDOWN_STEPS: u8 = 5;
/// Interval between countdown lights
pub const COUNTDOWN_STEP: Duration = Duration::from_secs(1);
/// Go-signal delay window, in milliseconds (upper bound exclusive)
pub const GO_DELAY_MIN_MS: u64 = 1500;
pub const GO_DELAY_MAX_MS: u64 = 5000;
/// How long reactions are collected after the go signal
pub const ROUND_DURATION: Duration = Duration::from_millis(3000);

/// Timing knobs for one race
#[derive(Debug, Clone)]
pub struct RaceTiming {
    pub countdown_steps: u8,
    pub countdown_step: Duration,
    pub go_delay_min_ms: u64,
    pub go_delay_max_ms: u64,
    pub round_duration: Duration,
}

impl Default for RaceTiming {
    fn default() -> Self {
        Self {
            countdown_steps: COUNTDOWN_STEPS,
            countdown_step: COUNTDOWN_STEP,
            go_delay_min_ms: GO_DELAY_MIN_MS,
            go_delay_max_ms: GO_DELAY_MAX_MS,
            round_duration: ROUND_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_millis_sign() {
        let go = Instant::now();
        assert_eq!(signed_millis(go, go + Duration::from_millis(120)), 120);
        assert_eq!(signed_millis(go + Duration::from_millis(50), go), -50);
        assert_eq!(signed_millis(go, go), 0);
    }

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(Duration::from_secs(0)), "00:00");
        assert_eq!(format_mm_ss(Duration::from_secs(75)), "01:15");
        assert_eq!(format_mm_ss(Duration::from_millis(3_599_999)), "59:59");
    }
}
