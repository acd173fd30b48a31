//! 5-field cron expression evaluation.
//!
//! Expressions use the classic `minute hour day-of-month month day-of-week`
//! form with comma, dash, slash and asterisk. Day-of-week accepts 0-7 where
//! 0 and 7 both mean Sunday, and when both day-of-month and day-of-week are
//! restricted the firing days are the union of the two.
//!
//! The underlying iterator is the `cron` crate, which speaks a
//! seconds-first, Sunday=1, intersection-based dialect. [`CronSchedule`]
//! normalizes on parse: a `0` seconds field is prepended, numeric
//! day-of-week tokens are rewritten to day names, and the union case is
//! evaluated as the earlier firing of two single-restriction schedules.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use thiserror::Error;

/// The expression could not be parsed as a 5-field cron string.
#[derive(Debug, Clone, Error)]
#[error("invalid cron expression '{expression}': {reason}")]
pub struct CronParseError {
    pub expression: String,
    pub reason: String,
}

const DOW_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedules: Vec<Schedule>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let err = |reason: String| CronParseError {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(err(format!("expected 5 fields, got {}", fields.len())));
        }
        let (minute, hour, dom, month) = (fields[0], fields[1], fields[2], fields[3]);
        let dow = normalize_dow(fields[4]).map_err(err)?;

        // Vixie rule: a field counts as restricted unless it starts with
        // '*'. Both restricted means the union of the two day fields.
        let dom_restricted = !dom.starts_with('*');
        let dow_restricted = !dow.starts_with('*');

        let padded = if dom_restricted && dow_restricted {
            vec![
                format!("0 {minute} {hour} {dom} {month} *"),
                format!("0 {minute} {hour} * {month} {dow}"),
            ]
        } else {
            vec![format!("0 {minute} {hour} {dom} {month} {dow}")]
        };

        let schedules = padded
            .iter()
            .map(|expanded| Schedule::from_str(expanded).map_err(|e| err(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.to_string(),
            schedules,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(&after).next())
            .min()
    }

    /// Gap between the next two firings after `t`; used to reject
    /// schedules tighter than a configured minimum interval.
    pub fn min_interval_from(&self, t: DateTime<Utc>) -> Option<Duration> {
        let first = self.next_after(t)?;
        let second = self.next_after(first)?;
        Some(second - first)
    }
}

/// Rewrite numeric day-of-week tokens into day names.
///
/// Names are identical across cron dialects; numbers are not (the standard
/// evaluator counts Sunday as 0 or 7). Numeric values and ranges expand to
/// explicit name lists, which also absorbs wrap cases like `5-7`.
fn normalize_dow(field: &str) -> Result<String, String> {
    if field == "*" {
        return Ok(field.to_string());
    }

    let mut out: Vec<String> = Vec::new();
    for part in field.split(',') {
        if part.is_empty() {
            return Err("empty day-of-week entry".to_string());
        }
        if part.starts_with('*') {
            // "*" or "*/n": stepping the full cycle lands on the same day
            // set in either dialect.
            out.push(part.to_string());
            continue;
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step in day-of-week '{part}'"))?;
                if step == 0 {
                    return Err(format!("zero step in day-of-week '{part}'"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let bounds = match range.split_once('-') {
            Some((lo, hi)) => lo
                .parse::<u32>()
                .ok()
                .zip(hi.parse::<u32>().ok())
                .map(|(lo, hi)| (lo, hi)),
            None => range.parse::<u32>().ok().map(|v| (v, v)),
        };

        match bounds {
            Some((lo, hi)) => {
                if lo > 7 || hi > 7 {
                    return Err(format!("day-of-week value out of range in '{part}'"));
                }
                if lo > hi {
                    return Err(format!("reversed day-of-week range '{part}'"));
                }
                let mut v = lo;
                while v <= hi {
                    out.push(DOW_NAMES[(v % 7) as usize].to_string());
                    v += step;
                }
            }
            // Named entry (MON, MON-FRI, MON-FRI/2, ...): dialects agree.
            None => out.push(part.to_string()),
        }
    }
    Ok(out.join(","))
}
