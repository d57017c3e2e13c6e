use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default settling delay ("Delayed visibility"): an absolute floor of
/// 10s between an event's wall-clock timestamp and
/// its delivery, absorbing write-to-read races in the upstream system
/// rather than debouncing rapid-fire events after that floor.
///
/// Modeled here as a property of the event connector rather than of
/// [`crate::EventQueue`] itself or the driver trait (grounding ledger
/// open-question decision 1): a driver that needs no settling passes
/// `Duration::ZERO`.
pub const DEFAULT_SETTLING_DELAY: Duration = Duration::from_secs(10);

/// How much longer, as of `now`, an event timestamped `event_time` must
/// wait before it is visible to consumers. Returns `Duration::ZERO`
/// once the floor has already elapsed.
#[must_use]
pub fn remaining_delay(event_time: DateTime<Utc>, now: DateTime<Utc>, floor: Duration) -> Duration {
    let elapsed = (now - event_time).to_std().unwrap_or(Duration::ZERO);
    floor.saturating_sub(elapsed)
}

/// Suspends the caller for [`remaining_delay`], if any is left.
pub async fn wait_for_settling(event_time: DateTime<Utc>, floor: Duration) {
    let remaining = remaining_delay(event_time, Utc::now(), floor);
    if !remaining.is_zero() {
        tokio::time::sleep(remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn fresh_event_must_wait_the_full_floor() {
        let now = Utc::now();
        let remaining = remaining_delay(now, now, Duration::from_secs(10));
        assert_eq!(remaining, Duration::from_secs(10));
    }

    #[test]
    fn event_past_the_floor_needs_no_further_wait() {
        let now = Utc::now();
        let event_time = now - ChronoDuration::seconds(30);
        let remaining = remaining_delay(event_time, now, Duration::from_secs(10));
        assert_eq!(remaining, Duration::ZERO);
    }

    #[test]
    fn rapid_succession_after_the_floor_is_not_additionally_delayed() {
        let now = Utc::now();
        let first = now - ChronoDuration::seconds(11);
        let second = now - ChronoDuration::milliseconds(1);
        assert_eq!(remaining_delay(first, now, Duration::from_secs(10)), Duration::ZERO);
        assert!(remaining_delay(second, now, Duration::from_secs(10)) > Duration::from_secs(9));
    }
}
