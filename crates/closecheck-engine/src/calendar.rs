//! Calendar-month arithmetic and tax filing cadences.
//!
//! Invariants:
//! - Shifting a date by N calendar months normalizes year/month and clamps
//!   the day to the end of short target months (Mar 31 − 1 month = Feb 28).
//! - A month-end anchor stays on month-end when rolled (Feb 28 + 1 month =
//!   Mar 31), matching how filing periods are scheduled.
//! - Filing cadence is inferred from the day span of a filed return's
//!   period: 28–31 days → monthly, 89–92 → quarterly, 365–366 → annual.
//!   Spans outside those ranges are ambiguous and yield `None`; callers
//!   route that to review rather than guessing.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Month arithmetic
// ---------------------------------------------------------------------------

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    }
}

/// Last day of the month containing `d`.
pub fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    let day = days_in_month(d.year(), d.month());
    NaiveDate::from_ymd_opt(d.year(), d.month(), day).unwrap_or(d)
}

/// Whether `d` is the last day of its month.
pub fn is_month_end(d: NaiveDate) -> bool {
    d == last_day_of_month(d)
}

/// Shift `d` by `months` calendar months (negative allowed), clamping the
/// day to the end of the target month.
///
/// Calendar months, not 30/60-day approximations: "older than 2 months as of
/// period end" is an accounting expectation, not a day count.
pub fn shift_months(d: NaiveDate, months: i32) -> NaiveDate {
    let total = d.year() * 12 + d.month() as i32 - 1 + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = d.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(d)
}

/// Shift like [`shift_months`], but a month-end anchor lands on month-end.
pub fn shift_months_anchored(d: NaiveDate, months: i32) -> NaiveDate {
    let shifted = shift_months(d, months);
    if is_month_end(d) {
        last_day_of_month(shifted)
    } else {
        shifted
    }
}

// ---------------------------------------------------------------------------
// Filing cadence
// ---------------------------------------------------------------------------

/// How often a tax agency files, inferred from observed return periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingCadence {
    Monthly,
    Quarterly,
    Annual,
}

impl FilingCadence {
    pub fn months(self) -> i32 {
        match self {
            FilingCadence::Monthly => 1,
            FilingCadence::Quarterly => 3,
            FilingCadence::Annual => 12,
        }
    }

    /// Infer the cadence from one filed period's inclusive day span.
    /// Returns `None` outside the observed ranges.
    pub fn from_period(start: NaiveDate, end: NaiveDate) -> Option<FilingCadence> {
        if end < start {
            return None;
        }
        let days = end.signed_duration_since(start).num_days() + 1;
        match days {
            28..=31 => Some(FilingCadence::Monthly),
            89..=92 => Some(FilingCadence::Quarterly),
            365..=366 => Some(FilingCadence::Annual),
            _ => None,
        }
    }
}

/// The most recent scheduled period end that closed strictly before
/// `period_end`, obtained by rolling `cadence` from `anchor_end` (the latest
/// filed period end).
///
/// The cadence rolls from the agency's own anchor; it is never aligned to
/// calendar quarters. A period that closes on the review date itself is not
/// yet expected to be filed.
pub fn expected_period_end(
    period_end: NaiveDate,
    cadence: FilingCadence,
    anchor_end: NaiveDate,
) -> NaiveDate {
    let step = cadence.months();
    let mut current = anchor_end;
    if current >= period_end {
        while current >= period_end {
            current = shift_months_anchored(current, -step);
        }
        return current;
    }
    loop {
        let next = shift_months_anchored(current, step);
        if next >= period_end {
            return current;
        }
        current = next;
    }
}

// ---------------------------------------------------------------------------
// Lenient parsing
// ---------------------------------------------------------------------------

/// Parse a date out of free-form metadata. Accepts ISO `YYYY-MM-DD` and the
/// reconciliation-report form `DD/MM/YYYY`.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 3 {
            let dd = parts[0].parse::<u32>().ok()?;
            let mm = parts[1].parse::<u32>().ok()?;
            let yyyy = parts[2].parse::<i32>().ok()?;
            return NaiveDate::from_ymd_opt(yyyy, mm, dd);
        }
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
