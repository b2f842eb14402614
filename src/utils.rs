use chrono::{Datelike, Days, NaiveDate, NaiveTime};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

pub fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Shifts a date by whole months, clamping the day to the target month's
/// length (Jan 31 + 1 month = Feb 28/29).
pub fn add_months_clamped(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month() as i32 - 1 + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = date.day().min(last_day_of_month(year, month).day());
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// First day of a trailing window of `months` calendar months ending on
/// `today`. The partial current month counts as one of them, so a 3-month
/// window starting from 2026-08-07 opens on 2026-06-01.
pub fn trailing_window_start(today: NaiveDate, months: u32) -> NaiveDate {
    let back = months.saturating_sub(1) as i32;
    let shifted = add_months_clamped(today, -back);
    month_start(shifted.year(), shifted.month())
}

/// Tolerant "HH:MM" parsing. Appointment times come from the store as free
/// text; anything unparseable is treated as midnight by callers rather than
/// surfaced as an error.
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
