//! Recurrence calculator: cron expression + IANA zone + instant in,
//! next UTC trigger instant out.
//!
//! Expressions use the standard five fields (minute, hour, day-of-month,
//! month, day-of-week) with an optional trailing seconds field. Fields
//! accept `*`, lists, ranges, steps, and 3-letter month/weekday names;
//! `0` and `7` both mean Sunday. When day-of-month and day-of-week are
//! both restricted, a date matching either fires (vixie rule).
//!
//! Evaluation happens in the schedule's timezone: candidates are probed
//! as local wall-clock times strictly later than the input instant and
//! mapped back through the zone's offset rules. A local time skipped by
//! spring-forward does not exist and is passed over; a local time that
//! occurs twice at fall-back resolves to its first UTC occurrence only,
//! so the same wall-clock time never fires twice. The result is always
//! UTC.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Probe horizon in minutes (~366 days). An expression with no match
/// inside this window is treated as unsatisfiable.
const HORIZON_MINUTES: i64 = 366 * 24 * 60;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DOW_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Errors from recurrence calculation.
#[derive(Debug, Error)]
pub enum CronError {
    /// The expression does not follow cron syntax.
    #[error("invalid cron expression {expr:?}: {detail}")]
    Parse { expr: String, detail: String },

    /// The schedule names a zone the IANA database does not know.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// No matching instant within the probe horizon.
    #[error("cron expression matches no instant within {0} days")]
    NoOccurrence(u32),
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    second: BTreeSet<u32>,
    minute: BTreeSet<u32>,
    hour: BTreeSet<u32>,
    dom: BTreeSet<u32>,
    month: BTreeSet<u32>,
    dow: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = |detail: String| CronError::Parse {
            expr: s.to_string(),
            detail,
        };

        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(parse_err(format!(
                "expected 5 fields (or 6 with trailing seconds), got {}",
                fields.len()
            )));
        }

        let (minute, _) = parse_field(fields[0], 0, 59, &[]).map_err(&parse_err)?;
        let (hour, _) = parse_field(fields[1], 0, 23, &[]).map_err(&parse_err)?;
        let (dom, dom_restricted) = parse_field(fields[2], 1, 31, &[]).map_err(&parse_err)?;
        let (month, _) = parse_field(fields[3], 1, 12, &MONTH_NAMES).map_err(&parse_err)?;
        let (mut dow, dow_restricted) = parse_field(fields[4], 0, 7, &DOW_NAMES).map_err(&parse_err)?;
        // 7 is an alias for Sunday.
        if dow.remove(&7) {
            dow.insert(0);
        }

        let second = if fields.len() == 6 {
            parse_field(fields[5], 0, 59, &[]).map_err(&parse_err)?.0
        } else {
            BTreeSet::from([0])
        };

        Ok(CronExpr {
            second,
            minute,
            hour,
            dom,
            month,
            dow,
            dom_restricted,
            dow_restricted,
        })
    }
}

impl CronExpr {
    fn matches_minute(&self, probe: &NaiveDateTime) -> bool {
        if !self.month.contains(&probe.month())
            || !self.hour.contains(&probe.hour())
            || !self.minute.contains(&probe.minute())
        {
            return false;
        }
        let dom_ok = self.dom.contains(&probe.day());
        let dow_ok = self.dow.contains(&probe.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }

    /// Earliest UTC instant strictly after `from` matching this
    /// expression when evaluated as wall-clock time in `tz`.
    pub fn next_after(&self, tz: Tz, from: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
        let from_local = from.with_timezone(&tz).naive_local();
        // Truncate to the minute; the seconds set is applied per candidate.
        let mut probe = from_local
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(from_local);

        for _ in 0..=HORIZON_MINUTES {
            if self.matches_minute(&probe) {
                for &sec in &self.second {
                    let candidate = probe + Duration::seconds(sec as i64);
                    // Map the local candidate through the zone's offset
                    // rules. A gapped time yields no instant. A repeated
                    // local time at fall-back is a single trigger on its
                    // first UTC occurrence; the later occurrence is never
                    // a candidate, so the same wall-clock time cannot
                    // fire twice.
                    let resolved = match tz.from_local_datetime(&candidate) {
                        LocalResult::None => None,
                        LocalResult::Single(dt) => Some(dt),
                        LocalResult::Ambiguous(earlier, _) => Some(earlier),
                    };
                    if let Some(dt) = resolved {
                        let utc = dt.with_timezone(&Utc);
                        if utc > from {
                            return Ok(utc);
                        }
                    }
                }
            }
            probe += Duration::minutes(1);
        }

        Err(CronError::NoOccurrence(366))
    }
}

/// Compute the next trigger instant for `expr` evaluated in `timezone`,
/// strictly after `from`. Pure and idempotent.
pub fn next_run(expr: &str, timezone: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let parsed: CronExpr = expr.parse()?;
    let tz: Tz = timezone
        .parse()
        .map_err(|_| CronError::UnknownTimezone(timezone.to_string()))?;
    parsed.next_after(tz, from)
}

/// Parse one cron field into its value set. The second element reports
/// whether the field restricts (anything other than a bare `*`).
fn parse_field(
    field: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<(BTreeSet<u32>, bool), String> {
    let mut set = BTreeSet::new();
    let mut restricted = false;

    for token in field.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(format!("empty token in field {field:?}"));
        }

        let (range_part, step) = match token.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s
                    .parse()
                    .map_err(|_| format!("invalid step in {token:?}"))?;
                if step == 0 {
                    return Err(format!("step cannot be 0 in {token:?}"));
                }
                (r, step)
            }
            None => (token, 1),
        };

        let (lo, hi) = if range_part == "*" {
            if token != "*" {
                restricted = true;
            }
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            restricted = true;
            (value_of(a, names, min, max)?, value_of(b, names, min, max)?)
        } else {
            restricted = true;
            let v = value_of(range_part, names, min, max)?;
            // A stepped single value means "from v to max" (vixie).
            if step > 1 { (v, max) } else { (v, v) }
        };

        if lo > hi {
            return Err(format!("inverted range in {token:?}"));
        }

        let mut v = lo;
        while v <= hi {
            set.insert(v);
            v += step;
        }
    }

    Ok((set, restricted))
}

/// Resolve a numeric or named field value and bounds-check it.
fn value_of(token: &str, names: &[&str], min: u32, max: u32) -> Result<u32, String> {
    let value = if let Ok(n) = token.parse::<u32>() {
        n
    } else {
        let lowered = token.to_ascii_lowercase();
        let idx = names
            .iter()
            .position(|n| *n == lowered)
            .ok_or_else(|| format!("invalid value {token:?}"))?;
        // Name tables start at the field minimum (jan = 1, sun = 0).
        min + idx as u32
    };
    if value < min || value > max {
        return Err(format!("value {value} out of range {min}-{max}"));
    }
    Ok(value)
}
