//! Top-level schedule expression: keywords, `every <duration>` intervals,
//! and full five-field cron (§4.3).

use qvault_core::constants::{SCHEDULE_MAX_INTERVAL_SECS, SCHEDULE_MIN_INTERVAL_SECS};
use qvault_core::types::Timestamp;

use crate::cron::CronExpr;
use crate::error::ScheduleError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Plain-addition interval in seconds, bounded to
    /// `[SCHEDULE_MIN_INTERVAL_SECS, SCHEDULE_MAX_INTERVAL_SECS]`.
    Interval(i64),
    Cron(CronExpr),
}

impl ScheduleSpec {
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let raw = raw.trim();
        match raw {
            "hourly" => Self::interval(60 * 60),
            "daily" => Ok(Self::Cron(CronExpr::parse("0 2 * * *")?)),
            "weekly" => Ok(Self::Cron(CronExpr::parse("0 2 * * 0")?)),
            _ => {
                if let Some(duration) = raw.strip_prefix("every ") {
                    Self::interval(parse_duration_secs(duration.trim())?)
                } else {
                    Ok(Self::Cron(CronExpr::parse(raw)?))
                }
            }
        }
    }

    fn interval(secs: i64) -> Result<Self, ScheduleError> {
        if secs < SCHEDULE_MIN_INTERVAL_SECS || secs > SCHEDULE_MAX_INTERVAL_SECS {
            return Err(ScheduleError::IntervalOutOfRange {
                secs,
                min: SCHEDULE_MIN_INTERVAL_SECS,
                max: SCHEDULE_MAX_INTERVAL_SECS,
            });
        }
        Ok(Self::Interval(secs))
    }

    /// Next run strictly after `after`: plain addition for intervals,
    /// field-jumping for cron (§4.3).
    pub fn next_run(&self, after: Timestamp) -> Result<Timestamp, ScheduleError> {
        match self {
            ScheduleSpec::Interval(secs) => Ok(after + secs),
            ScheduleSpec::Cron(expr) => expr.next_run(after),
        }
    }
}

/// Parses a duration like `90s`, `30m`, `2h`, `1d` into seconds.
fn parse_duration_secs(raw: &str) -> Result<i64, ScheduleError> {
    let bad = || ScheduleError::BadFormat(format!("bad duration {raw}"));
    if raw.is_empty() {
        return Err(bad());
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let n: i64 = digits.parse().map_err(|_| bad())?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(bad()),
    };
    n.checked_mul(multiplier).ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_keyword_is_one_hour_interval() {
        assert_eq!(ScheduleSpec::parse("hourly").unwrap(), ScheduleSpec::Interval(3600));
    }

    #[test]
    fn daily_keyword_is_2am_cron() {
        let expected = ScheduleSpec::Cron(CronExpr::parse("0 2 * * *").unwrap());
        assert_eq!(ScheduleSpec::parse("daily").unwrap(), expected);
    }

    #[test]
    fn weekly_keyword_is_sunday_2am_cron() {
        let expected = ScheduleSpec::Cron(CronExpr::parse("0 2 * * 0").unwrap());
        assert_eq!(ScheduleSpec::parse("weekly").unwrap(), expected);
    }

    #[test]
    fn every_duration_parses_and_bounds_are_enforced() {
        assert_eq!(ScheduleSpec::parse("every 30m").unwrap(), ScheduleSpec::Interval(1800));
        assert!(matches!(
            ScheduleSpec::parse("every 10s"),
            Err(ScheduleError::IntervalOutOfRange { .. })
        ));
        assert!(matches!(
            ScheduleSpec::parse("every 31d"),
            Err(ScheduleError::IntervalOutOfRange { .. })
        ));
    }

    #[test]
    fn bare_cron_expression_parses() {
        assert!(matches!(ScheduleSpec::parse("*/15 * * * *").unwrap(), ScheduleSpec::Cron(_)));
    }
}
