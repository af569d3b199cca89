//! Countdown rendering.

use std::time::Duration;

/// Renders `remaining` as `"HHh MMm SSs"`, or `"Expired"` once it is zero.
///
/// Hours are not wrapped into days, so a 30-day license starts at
/// `"720h 00m 00s"`. Partial seconds round up; only zero reads `"Expired"`.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    if remaining.is_zero() {
        return "Expired".to_string();
    }
    let total = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}h {minutes:02}m {seconds:02}s")
}
