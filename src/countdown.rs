use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Countdown {
    Remaining(Remaining),
    Expired,
}

impl Countdown {
    pub fn is_expired(&self) -> bool {
        matches!(self, Countdown::Expired)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Remaining(remaining) => remaining.fmt(f),
            Countdown::Expired => f.write_str("Expired"),
        }
    }
}

pub fn maturity(start: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    start + window
}

/// Time left until `start + window`, truncated to whole seconds.
pub fn countdown(now: DateTime<Utc>, start: DateTime<Utc>, window: Duration) -> Countdown {
    let left = maturity(start, window) - now;
    let total = left.num_seconds();

    if left <= Duration::zero() {
        return Countdown::Expired;
    }

    Countdown::Remaining(Remaining {
        days: total / 86_400,
        hours: (total % 86_400) / 3_600,
        minutes: (total % 3_600) / 60,
        seconds: total % 60,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn one_second_before_maturity() {
        let window = Duration::days(20);
        let now = start() + window - Duration::seconds(1);

        let countdown = countdown(now, start(), window);
        assert_eq!(
            countdown,
            Countdown::Remaining(Remaining {
                days: 0,
                hours: 0,
                minutes: 0,
                seconds: 1
            })
        );
        assert_eq!(countdown.to_string(), "0d 00h 00m 01s");
    }

    #[test]
    fn expired_at_and_after_maturity() {
        let window = Duration::days(20);

        assert!(countdown(start() + window, start(), window).is_expired());
        assert!(countdown(start() + window + Duration::seconds(1), start(), window).is_expired());
    }

    #[test]
    fn formats_with_padding() {
        let now = start() + Duration::hours(5) + Duration::seconds(7);
        let countdown = countdown(now, start(), Duration::days(20));

        assert_eq!(countdown.to_string(), "19d 18h 59m 53s");
    }

    #[test]
    fn full_window_at_start() {
        let countdown = countdown(start(), start(), Duration::days(21));

        assert_eq!(countdown.to_string(), "21d 00h 00m 00s");
    }

    #[test]
    fn sub_second_remainder_is_not_expired() {
        let window = Duration::days(1);
        let now = start() + window - Duration::milliseconds(400);

        let countdown = countdown(now, start(), window);
        assert!(!countdown.is_expired());
        assert_eq!(countdown.to_string(), "0d 00h 00m 00s");
    }
}
