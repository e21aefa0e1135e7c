//! Cron intervals for timed plugins.
//!
//! Intervals are classic five-field expressions (`min hour dom month dow`).
//! The `cron` crate wants seconds and an optional year, so the expression is
//! padded to `0 <expr> *` before parsing.
//!
//! # Due rule
//!
//! On every timer tick the router asks each [`TimedSchedule`] whether it is
//! due: the first fire time strictly after `last_run` is computed, and the
//! plugin runs when that time is at or before the current minute (the tick
//! time truncated to minute granularity). Running advances `last_run` to the
//! current minute, so a second tick within the same minute never fires again.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, TimeZone, Timelike};
use cron::Schedule;

use crate::error::{ScheduleError, ScheduleResult};

/// A validated five-field cron expression.
#[derive(Debug, Clone)]
pub struct CronInterval {
    expr: String,
    schedule: Schedule,
}

impl CronInterval {
    /// Parses and validates an expression.
    pub fn parse(expr: &str) -> ScheduleResult<Self> {
        let expr = expr.trim();
        let found = expr.split_whitespace().count();
        if found != 5 {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_string(),
                found,
            });
        }

        let schedule = format!("0 {expr} *")
            .parse::<Schedule>()
            .map_err(|e| ScheduleError::Invalid {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    /// The original expression.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }
}

impl FromStr for CronInterval {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Drops seconds and sub-second precision.
pub fn truncate_to_minute<Tz: TimeZone>(dt: DateTime<Tz>) -> DateTime<Tz> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Scheduling state of one timed plugin.
#[derive(Debug, Clone)]
pub struct TimedSchedule {
    interval: CronInterval,
    last_run: DateTime<Local>,
}

impl TimedSchedule {
    /// Creates the schedule with `last_run` set to `base` (normally the time
    /// the gateway started).
    pub fn new(interval: CronInterval, base: DateTime<Local>) -> Self {
        Self {
            interval,
            last_run: base,
        }
    }

    /// The plugin's interval.
    pub fn interval(&self) -> &CronInterval {
        &self.interval
    }

    /// Last time the plugin ran (or the base time).
    pub fn last_run(&self) -> DateTime<Local> {
        self.last_run
    }

    /// Checks the due rule at `now`; when due, advances `last_run` to the
    /// current minute and returns `true`.
    pub fn poll(&mut self, now: DateTime<Local>) -> bool {
        let current = truncate_to_minute(now);
        match self.interval.next_after(&self.last_run) {
            Some(next) if next <= current => {
                self.last_run = current;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_requires_five_fields() {
        assert!(CronInterval::parse("* * * * *").is_ok());
        assert!(CronInterval::parse("*/15 9-17 * * *").is_ok());
        assert!(matches!(
            CronInterval::parse("* * * *"),
            Err(ScheduleError::FieldCount { found: 4, .. })
        ));
        assert!(matches!(
            CronInterval::parse("0 * * * * *"),
            Err(ScheduleError::FieldCount { found: 6, .. })
        ));
        assert!(matches!(
            CronInterval::parse("banana * * * *"),
            Err(ScheduleError::Invalid { .. })
        ));
    }

    #[test]
    fn test_truncate_to_minute() {
        let t = at(12, 34, 56) + Duration::milliseconds(789);
        assert_eq!(truncate_to_minute(t), at(12, 34, 0));
    }

    #[test]
    fn test_every_minute_fires_once_per_minute() {
        let interval = CronInterval::parse("* * * * *").unwrap();
        let base = at(12, 0, 0);
        let mut schedule = TimedSchedule::new(interval, base);

        // Same minute as the base: nothing due yet.
        assert!(!schedule.poll(at(12, 0, 30)));

        // T + 61s
        assert!(schedule.poll(base + Duration::seconds(61)));
        assert_eq!(schedule.last_run(), at(12, 1, 0));

        // A second tick within the same minute does not fire again.
        assert!(!schedule.poll(at(12, 1, 45)));
        assert_eq!(schedule.last_run(), at(12, 1, 0));

        assert!(schedule.poll(at(12, 2, 1)));
    }

    #[test]
    fn test_missed_ticks_collapse_into_one_run() {
        let interval = CronInterval::parse("* * * * *").unwrap();
        let mut schedule = TimedSchedule::new(interval, at(12, 0, 0));
        assert!(schedule.poll(at(12, 10, 5)));
        assert_eq!(schedule.last_run(), at(12, 10, 0));
        assert!(!schedule.poll(at(12, 10, 50)));
    }

    #[test]
    fn test_hourly_interval_waits_for_boundary() {
        let interval = CronInterval::parse("0 * * * *").unwrap();
        let mut schedule = TimedSchedule::new(interval, at(12, 5, 0));
        assert!(!schedule.poll(at(12, 59, 59)));
        assert!(schedule.poll(at(13, 0, 2)));
        assert!(!schedule.poll(at(13, 30, 0)));
    }
}
