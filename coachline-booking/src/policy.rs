use chrono::Duration;

/// Upper bound for any configured window; larger values are clamped.
const MAX_WINDOW_SECONDS: i64 = 365 * 24 * 3600;

/// Time windows that govern holds, cancellations and surprise reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// How long an unpaid reservation keeps its seats.
    pub hold_window: Duration,
    /// Minimum time before departure at which a passenger may still cancel.
    pub cancellation_cutoff: Duration,
    /// A surprise destination may be revealed on request once departure is
    /// at most this far away.
    pub reveal_window: Duration,
    /// The automatic surprise reminder goes out once departure is at most
    /// this far away.
    pub reminder_lead: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_window: Duration::minutes(15),
            cancellation_cutoff: Duration::hours(2),
            reveal_window: Duration::hours(5),
            reminder_lead: Duration::hours(3),
        }
    }
}

impl BookingPolicy {
    /// Builds a policy from the `*_seconds` values of the business rules.
    /// Values are clamped to `0..=365 days`.
    pub fn from_seconds(hold: i64, cancellation_cutoff: i64, reveal_window: i64, reminder_lead: i64) -> Self {
        let window = |seconds: i64| Duration::seconds(seconds.clamp(0, MAX_WINDOW_SECONDS));
        Self {
            hold_window: window(hold),
            cancellation_cutoff: window(cancellation_cutoff),
            reveal_window: window(reveal_window),
            reminder_lead: window(reminder_lead),
        }
    }
}

pub(crate) fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_configured_seconds() {
        assert_eq!(BookingPolicy::from_seconds(900, 7200, 18000, 10800), BookingPolicy::default());
        assert_eq!(hours(Duration::minutes(90)), 1.5);
    }

    #[test]
    fn test_out_of_range_seconds_are_clamped() {
        let policy = BookingPolicy::from_seconds(i64::MAX, -1, i64::MIN, 10800);
        assert_eq!(policy.hold_window, Duration::days(365));
        assert_eq!(policy.cancellation_cutoff, Duration::zero());
        assert_eq!(policy.reveal_window, Duration::zero());
        assert_eq!(policy.reminder_lead, Duration::hours(3));
    }
}
