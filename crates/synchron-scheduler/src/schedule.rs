use chrono::{DateTime, Duration, Utc};

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3600;

/// Recurring wall-clock cadence derived from a configuration's interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every minute `M` of every hour with `M % n == 0` (UTC, second 0).
    EveryMinutes(u32),
    /// Minute 0 of every hour `H` with `H % n == 0` (UTC).
    EveryHours(u32),
}

impl Trigger {
    /// Translate an interval in minutes into a trigger.
    ///
    /// Intervals of an hour or more are floored to whole hours, so 90 minutes
    /// fires hourly. Values of 24 hours and above fire once a day at 00:00.
    pub fn from_interval(minutes: u32) -> Self {
        if minutes < 60 {
            Trigger::EveryMinutes(minutes.max(1))
        } else {
            Trigger::EveryHours(minutes / 60)
        }
    }

    /// Five-field cron rendering, for logs.
    pub fn cron_expression(&self) -> String {
        match self {
            Trigger::EveryMinutes(n) => format!("*/{n} * * * *"),
            Trigger::EveryHours(n) => format!("0 */{n} * * *"),
        }
    }

    /// First firing strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let (unit, modulus, step) = match *self {
            Trigger::EveryMinutes(n) => (SECS_PER_MINUTE, 60_i64, n),
            Trigger::EveryHours(n) => (SECS_PER_HOUR, 24_i64, n),
        };
        let step = i64::from(step.max(1));

        // Slot index since the epoch; the epoch is aligned to both hours and days.
        let mut slot = from.timestamp().div_euclid(unit) + 1;
        while slot.rem_euclid(modulus) % step != 0 {
            slot += 1;
        }

        let subsec = Duration::nanoseconds(i64::from(from.timestamp_subsec_nanos()));
        from + Duration::seconds(slot * unit - from.timestamp()) - subsec
    }
}
