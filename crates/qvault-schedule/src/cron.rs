//! Five-field cron expressions (§4.3): `minute hour day-of-month month
//! day-of-week`, full syntax (`*`, single values, ranges, steps, lists).

use chrono::{Datelike, Timelike};
use qvault_core::types::Timestamp;

use crate::error::ScheduleError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronField {
    values: Vec<u8>,
}

impl CronField {
    fn parse(raw: &str, min: u8, max: u8) -> Result<Self, ScheduleError> {
        let mut values = std::collections::BTreeSet::new();
        for part in raw.split(',') {
            for v in Self::parse_part(part, min, max)? {
                values.insert(v);
            }
        }
        Ok(Self {
            values: values.into_iter().collect(),
        })
    }

    fn parse_part(part: &str, min: u8, max: u8) -> Result<Vec<u8>, ScheduleError> {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: i64 = s
                    .parse()
                    .map_err(|_| ScheduleError::BadFormat(format!("bad step {s}")))?;
                if step <= 0 {
                    return Err(ScheduleError::BadStep);
                }
                (r, step as u8)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let start: i64 = a
                .parse()
                .map_err(|_| ScheduleError::BadFormat(format!("bad range start {a}")))?;
            let end: i64 = b
                .parse()
                .map_err(|_| ScheduleError::BadFormat(format!("bad range end {b}")))?;
            if end < start {
                return Err(ScheduleError::BadRange { start, end });
            }
            Self::check_range(start, min, max)?;
            Self::check_range(end, min, max)?;
            (start as u8, end as u8)
        } else {
            let v: i64 = range_part
                .parse()
                .map_err(|_| ScheduleError::BadFormat(format!("bad value {range_part}")))?;
            Self::check_range(v, min, max)?;
            (v as u8, v as u8)
        };

        let mut out = Vec::new();
        let mut v = start;
        while v <= end {
            out.push(v);
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
        Ok(out)
    }

    fn check_range(v: i64, min: u8, max: u8) -> Result<(), ScheduleError> {
        if v < min as i64 || v > max as i64 {
            return Err(ScheduleError::OutOfRange {
                value: v,
                min: min as i64,
                max: max as i64,
            });
        }
        Ok(())
    }

    fn contains(&self, v: u8) -> bool {
        self.values.contains(&v)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpr {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::BadFormat(format!(
                "expected 5 cron fields, got {}",
                fields.len()
            )));
        }
        Ok(Self {
            minute: CronField::parse(fields[0], 0, 59)?,
            hour: CronField::parse(fields[1], 0, 23)?,
            day_of_month: CronField::parse(fields[2], 1, 31)?,
            month: CronField::parse(fields[3], 1, 12)?,
            day_of_week: CronField::parse(fields[4], 0, 6)?,
        })
    }

    fn matches(&self, dt: &chrono::DateTime<chrono::Utc>) -> bool {
        self.minute.contains(dt.minute() as u8)
            && self.hour.contains(dt.hour() as u8)
            && self.day_of_month.contains(dt.day() as u8)
            && self.month.contains(dt.month() as u8)
            && self.day_of_week.contains(dt.weekday().num_days_from_sunday() as u8)
    }

    /// Field-jumping search for the first matching minute strictly after
    /// `after`: each field is checked outermost-first (month, then day,
    /// then hour, then minute) and advanced directly to its next candidate
    /// value rather than scanning minute-by-minute, bounded by
    /// `SCHEDULE_MAX_LOOKAHEAD_YEARS` (§4.3). Day-of-month and day-of-week
    /// combine with AND: a day must satisfy both restricted fields, which
    /// is a simplification of the traditional OR-when-both-restricted cron
    /// rule spec.md leaves unspecified.
    pub fn next_run(&self, after: Timestamp) -> Result<Timestamp, ScheduleError> {
        use chrono::{Duration, TimeZone, Utc};

        let start = Utc
            .timestamp_opt(after, 0)
            .single()
            .ok_or_else(|| ScheduleError::BadFormat("invalid timestamp".into()))?;
        let bound = start + Duration::days(366 * qvault_core::constants::SCHEDULE_MAX_LOOKAHEAD_YEARS);

        // Truncate to the minute and step forward one minute so the result is
        // always strictly greater than `after` (§4.3 tie-break rule).
        let mut candidate = start
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(start)
            + Duration::minutes(1);

        let max_outer_steps: u64 = 366 * qvault_core::constants::SCHEDULE_MAX_LOOKAHEAD_YEARS as u64 * 24 * 60;
        let mut steps: u64 = 0;

        loop {
            if candidate > bound {
                return Err(ScheduleError::LookaheadExceeded);
            }
            steps += 1;
            if steps > max_outer_steps {
                return Err(ScheduleError::LookaheadExceeded);
            }

            if !self.month.contains(candidate.month() as u8) {
                candidate = Self::start_of_next_month(candidate);
                continue;
            }
            if !self.day_of_month.contains(candidate.day() as u8)
                || !self.day_of_week.contains(candidate.weekday().num_days_from_sunday() as u8)
            {
                candidate = Self::start_of_next_day(candidate);
                continue;
            }
            if !self.hour.contains(candidate.hour() as u8) {
                candidate = Self::start_of_next_hour(candidate);
                continue;
            }
            if !self.minute.contains(candidate.minute() as u8) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Ok(candidate.timestamp());
        }
    }

    fn start_of_next_month(dt: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        use chrono::{TimeZone, Utc};
        let (year, month) = if dt.month() == 12 { (dt.year() + 1, 1) } else { (dt.year(), dt.month() + 1) };
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().unwrap_or(dt)
    }

    fn start_of_next_day(dt: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        use chrono::Duration;
        let next = dt + Duration::days(1);
        next.with_hour(0)
            .and_then(|d| d.with_minute(0))
            .and_then(|d| d.with_second(0))
            .unwrap_or(next)
    }

    fn start_of_next_hour(dt: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        use chrono::Duration;
        let next = dt + Duration::hours(1);
        next.with_minute(0).and_then(|d| d.with_second(0)).unwrap_or(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fifteen_minutes_expands_correctly() {
        let field = CronField::parse("*/15", 0, 59).unwrap();
        assert_eq!(field.values, vec![0, 15, 30, 45]);
    }

    #[test]
    fn bad_step_rejected() {
        assert!(matches!(CronField::parse("*/0", 0, 59), Err(ScheduleError::BadStep)));
    }

    #[test]
    fn bad_range_rejected() {
        assert!(matches!(
            CronField::parse("10-5", 0, 59),
            Err(ScheduleError::BadRange { .. })
        ));
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(matches!(
            CronField::parse("99", 0, 59),
            Err(ScheduleError::OutOfRange { .. })
        ));
    }

    #[test]
    fn list_and_ranges_combine() {
        let field = CronField::parse("1,3,5-7", 0, 59).unwrap();
        assert_eq!(field.values, vec![1, 3, 5, 6, 7]);
    }

    #[test]
    fn business_hours_weekday_next_run_from_monday_morning() {
        use chrono::{TimeZone, Utc};
        let expr = CronExpr::parse("0 9-17 * * 1-5").unwrap();
        // Monday 2024-01-01 08:00 UTC.
        let monday_0800 = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap().timestamp();
        let next = expr.next_run(monday_0800).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap().timestamp();
        assert_eq!(next, expected);
    }

    #[test]
    fn business_hours_weekday_next_run_from_friday_evening_rolls_to_monday() {
        use chrono::{TimeZone, Utc};
        let expr = CronExpr::parse("0 9-17 * * 1-5").unwrap();
        // Friday 2024-01-05 17:30 UTC.
        let friday_1730 = Utc.with_ymd_and_hms(2024, 1, 5, 17, 30, 0).unwrap().timestamp();
        let next = expr.next_run(friday_1730).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap().timestamp();
        assert_eq!(next, expected);
    }

    #[test]
    fn tie_break_is_strictly_greater() {
        use chrono::{TimeZone, Utc};
        let expr = CronExpr::parse("0 2 * * *").unwrap();
        let exactly_2am = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap().timestamp();
        let next = expr.next_run(exactly_2am).unwrap();
        assert!(next > exactly_2am);
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap().timestamp();
        assert_eq!(next, expected);
    }
}
