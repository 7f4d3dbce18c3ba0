//! Calendar-aware decoding of CF time encodings.
//!
//! Everything here is pure: `(units string, calendar, numeric offset) -> instant`.
//! Non-Gregorian calendars get their own day arithmetic; a `360_day` offset of
//! 59 days from January 1st lands on February 30th, never on March 1st.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Julian day number of 0001-01-01 (proleptic Gregorian) minus one.
const JDN_CE_OFFSET: i64 = 1_721_425;

/// Julian day number of 1582-10-15, the first day of the Gregorian reform.
const GREGORIAN_REFORM_JDN: i64 = 2_299_161;

const CUMULATIVE_DAYS: [u32; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const CUMULATIVE_DAYS_LEAP: [u32; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// Errors raised while decoding a time encoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeDecodeError {
    #[error("unrecognized time units '{0}'")]
    UnrecognizedUnits(String),

    #[error("unknown calendar '{0}'")]
    UnknownCalendar(String),

    #[error("invalid reference date '{0}'")]
    InvalidReferenceDate(String),

    #[error("unit '{unit}' is not well defined in the {calendar} calendar")]
    UnitNotSupported { unit: String, calendar: Calendar },

    #[error("non-finite time value")]
    NonFiniteValue,

    #[error("time value out of representable range")]
    OutOfRange,
}

/// The closed set of CF calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    /// Mixed Julian/Gregorian with the 1582-10-15 switch (`standard`, `gregorian`)
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "proleptic_gregorian")]
    ProlepticGregorian,
    /// 365-day years (`noleap`, `365_day`)
    #[serde(rename = "noleap")]
    NoLeap,
    /// 366-day years (`all_leap`, `366_day`)
    #[serde(rename = "all_leap")]
    AllLeap,
    /// Twelve 30-day months
    #[serde(rename = "360_day")]
    Day360,
    #[serde(rename = "julian")]
    Julian,
}

impl Calendar {
    /// Parse a CF `calendar` attribute. An absent attribute means `standard`.
    pub fn parse(value: Option<&str>) -> Result<Self, TimeDecodeError> {
        let Some(raw) = value else {
            return Ok(Calendar::Standard);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            "julian" => Ok(Calendar::Julian),
            _ => Err(TimeDecodeError::UnknownCalendar(raw.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
            Calendar::Julian => "julian",
        }
    }

    pub fn is_leap_year(&self, year: i64) -> bool {
        let julian_leap = year.rem_euclid(4) == 0;
        let gregorian_leap = julian_leap && (year.rem_euclid(100) != 0 || year.rem_euclid(400) == 0);
        match self {
            Calendar::ProlepticGregorian => gregorian_leap,
            Calendar::Standard => {
                if year < 1582 {
                    julian_leap
                } else {
                    gregorian_leap
                }
            }
            Calendar::Julian => julian_leap,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_month(&self, year: i64, month: u32) -> u32 {
        match self {
            Calendar::Day360 => 30,
            _ => {
                let table = if self.is_leap_year(year) {
                    &CUMULATIVE_DAYS_LEAP
                } else {
                    &CUMULATIVE_DAYS
                };
                let m = month as usize;
                table[m] - table[m - 1]
            }
        }
    }

    /// Check that a date exists in this calendar.
    pub fn is_valid_date(&self, year: i64, month: u32, day: u32) -> bool {
        if !(1..=12).contains(&month) || day == 0 || day > self.days_in_month(year, month) {
            return false;
        }
        // The ten days dropped by the Gregorian reform never existed.
        !(*self == Calendar::Standard && year == 1582 && month == 10 && (5..=14).contains(&day))
    }

    /// Day count from the calendar's own origin. Only differences within one
    /// calendar are meaningful.
    fn day_number(&self, year: i64, month: u32, day: u32) -> Result<i64, TimeDecodeError> {
        let m = month as i64;
        let d = day as i64;
        let fixed_year = |year_len: i64, day_of_year: i64| {
            year.checked_mul(year_len)
                .and_then(|days| days.checked_add(day_of_year))
                .ok_or(TimeDecodeError::OutOfRange)
        };
        match self {
            Calendar::Day360 => fixed_year(360, (m - 1) * 30 + (d - 1)),
            Calendar::NoLeap => fixed_year(365, CUMULATIVE_DAYS[(m - 1) as usize] as i64 + d - 1),
            Calendar::AllLeap => fixed_year(366, CUMULATIVE_DAYS_LEAP[(m - 1) as usize] as i64 + d - 1),
            Calendar::Julian => julian_to_jdn(year, month, day),
            Calendar::ProlepticGregorian => gregorian_to_jdn(year, month, day),
            Calendar::Standard => {
                if (year, month, day) >= (1582, 10, 15) {
                    gregorian_to_jdn(year, month, day)
                } else {
                    julian_to_jdn(year, month, day)
                }
            }
        }
    }

    fn date_from_day_number(&self, n: i64) -> Result<(i64, u32, u32), TimeDecodeError> {
        match self {
            Calendar::Day360 => {
                let year = n.div_euclid(360);
                let rem = n.rem_euclid(360);
                Ok((year, (rem / 30 + 1) as u32, (rem % 30 + 1) as u32))
            }
            Calendar::NoLeap => Ok(split_fixed_year(n, 365, &CUMULATIVE_DAYS)),
            Calendar::AllLeap => Ok(split_fixed_year(n, 366, &CUMULATIVE_DAYS_LEAP)),
            Calendar::Julian => Ok(jdn_to_julian(n)),
            Calendar::ProlepticGregorian => jdn_to_gregorian(n),
            Calendar::Standard => {
                if n >= GREGORIAN_REFORM_JDN {
                    jdn_to_gregorian(n)
                } else {
                    Ok(jdn_to_julian(n))
                }
            }
        }
    }

    /// Microseconds since the calendar origin.
    pub fn timestamp(&self, dt: &CalendarDateTime) -> Result<i64, TimeDecodeError> {
        let days = self.day_number(dt.year, dt.month, dt.day)?;
        let time_of_day = (dt.hour as i64 * 3600 + dt.minute as i64 * 60 + dt.second as i64)
            * MICROS_PER_SECOND
            + dt.microsecond as i64;
        days.checked_mul(MICROS_PER_DAY)
            .and_then(|v| v.checked_add(time_of_day))
            .ok_or(TimeDecodeError::OutOfRange)
    }

    pub fn from_timestamp(&self, micros: i64) -> Result<CalendarDateTime, TimeDecodeError> {
        let days = micros.div_euclid(MICROS_PER_DAY);
        let rem = micros.rem_euclid(MICROS_PER_DAY);
        let (year, month, day) = self.date_from_day_number(days)?;
        let secs = rem / MICROS_PER_SECOND;
        Ok(CalendarDateTime {
            year,
            month,
            day,
            hour: (secs / 3600) as u32,
            minute: (secs % 3600 / 60) as u32,
            second: (secs % 60) as u32,
            microsecond: (rem % MICROS_PER_SECOND) as u32,
        })
    }

    /// Signed distance `b - a` in seconds.
    pub fn seconds_between(
        &self,
        a: &CalendarDateTime,
        b: &CalendarDateTime,
    ) -> Result<f64, TimeDecodeError> {
        let delta = self
            .timestamp(b)?
            .checked_sub(self.timestamp(a)?)
            .ok_or(TimeDecodeError::OutOfRange)?;
        Ok(delta as f64 / MICROS_PER_SECOND as f64)
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn gregorian_to_jdn(year: i64, month: u32, day: u32) -> Result<i64, TimeDecodeError> {
    let y = i32::try_from(year).map_err(|_| TimeDecodeError::OutOfRange)?;
    let date = NaiveDate::from_ymd_opt(y, month, day).ok_or(TimeDecodeError::OutOfRange)?;
    Ok(date.num_days_from_ce() as i64 + JDN_CE_OFFSET)
}

fn jdn_to_gregorian(jdn: i64) -> Result<(i64, u32, u32), TimeDecodeError> {
    let days = i32::try_from(jdn - JDN_CE_OFFSET).map_err(|_| TimeDecodeError::OutOfRange)?;
    let date = NaiveDate::from_num_days_from_ce_opt(days).ok_or(TimeDecodeError::OutOfRange)?;
    Ok((date.year() as i64, date.month(), date.day()))
}

fn julian_to_jdn(year: i64, month: u32, day: u32) -> Result<i64, TimeDecodeError> {
    let a = (14 - month as i64) / 12;
    let m = month as i64 + 12 * a - 3;
    let y = year.checked_add(4800 - a).ok_or(TimeDecodeError::OutOfRange)?;
    y.checked_mul(365)
        .and_then(|days| days.checked_add(y.div_euclid(4)))
        .and_then(|days| days.checked_add(day as i64 + (153 * m + 2) / 5 - 32083))
        .ok_or(TimeDecodeError::OutOfRange)
}

fn jdn_to_julian(jdn: i64) -> (i64, u32, u32) {
    let c = jdn + 32082;
    let d = (4 * c + 3).div_euclid(1461);
    let e = c - (1461 * d).div_euclid(4);
    let m = (5 * e + 2) / 153;
    let day = e - (153 * m + 2) / 5 + 1;
    let month = m + 3 - 12 * (m / 10);
    let year = d - 4800 + m / 10;
    (year, month as u32, day as u32)
}

fn split_fixed_year(n: i64, year_len: i64, table: &[u32; 13]) -> (i64, u32, u32) {
    let year = n.div_euclid(year_len);
    let doy = n.rem_euclid(year_len) as u32;
    let month = (1..=12).find(|&m| doy < table[m]).unwrap_or(12);
    (year, month as u32, doy - table[month - 1] + 1)
}

/// A calendar-agnostic broken-down instant. Field order gives chronological
/// ordering within one calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDateTime {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl CalendarDateTime {
    pub fn ymd(year: i64, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            microsecond: 0,
        }
    }

    pub fn with_time(mut self, hour: u32, minute: u32, second: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }
}

impl fmt::Display for CalendarDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.year < 0 {
            write!(f, "-{:04}", -self.year)?;
        } else {
            write!(f, "{:04}", self.year)?;
        }
        write!(
            f,
            "-{:02}-{:02} {:02}:{:02}:{:02}",
            self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.microsecond > 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        Ok(())
    }
}

impl Serialize for CalendarDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Unit of a `<unit> since <reference>` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "nanoseconds" | "nanosecond" | "ns" | "nsec" | "nsecs" => TimeUnit::Nanoseconds,
            "microseconds" | "microsecond" | "us" | "usec" | "usecs" => TimeUnit::Microseconds,
            "milliseconds" | "millisecond" | "ms" | "msec" | "msecs" => TimeUnit::Milliseconds,
            "seconds" | "second" | "secs" | "sec" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "mins" | "min" => TimeUnit::Minutes,
            "hours" | "hour" | "hrs" | "hr" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            "weeks" | "week" => TimeUnit::Weeks,
            "months" | "month" => TimeUnit::Months,
            "years" | "year" => TimeUnit::Years,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        }
    }

    /// Length of one unit in microseconds. Months and years only have a fixed
    /// length in the 360-day calendar.
    pub fn micros(&self, calendar: Calendar) -> Result<f64, TimeDecodeError> {
        let micros = match self {
            TimeUnit::Nanoseconds => return Ok(0.001),
            TimeUnit::Microseconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Seconds => MICROS_PER_SECOND,
            TimeUnit::Minutes => 60 * MICROS_PER_SECOND,
            TimeUnit::Hours => 3600 * MICROS_PER_SECOND,
            TimeUnit::Days => MICROS_PER_DAY,
            TimeUnit::Weeks => 7 * MICROS_PER_DAY,
            TimeUnit::Months | TimeUnit::Years => {
                if calendar != Calendar::Day360 {
                    return Err(TimeDecodeError::UnitNotSupported {
                        unit: self.name().to_string(),
                        calendar,
                    });
                }
                if *self == TimeUnit::Months {
                    30 * MICROS_PER_DAY
                } else {
                    360 * MICROS_PER_DAY
                }
            }
        };
        Ok(micros as f64)
    }

    /// Length of one unit in seconds.
    pub fn seconds(&self, calendar: Calendar) -> Result<f64, TimeDecodeError> {
        Ok(self.micros(calendar)? / MICROS_PER_SECOND as f64)
    }
}

/// A parsed `<unit> since <reference>` string.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: CalendarDateTime,
    /// UTC offset of the reference, in minutes.
    pub utc_offset_minutes: i64,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self, TimeDecodeError> {
        let lowered = units.trim().to_ascii_lowercase();
        let unrecognized = || TimeDecodeError::UnrecognizedUnits(units.to_string());
        let (unit_part, reference_part) = lowered.split_once(" since ").ok_or_else(unrecognized)?;
        let unit = TimeUnit::parse(unit_part.trim()).ok_or_else(unrecognized)?;
        let (reference, utc_offset_minutes) = parse_reference(reference_part.trim())
            .ok_or_else(|| TimeDecodeError::InvalidReferenceDate(reference_part.trim().to_string()))?;
        Ok(Self {
            unit,
            reference,
            utc_offset_minutes,
        })
    }
}

/// Whether a `units` attribute looks like a time encoding at all. Used to
/// spot time coordinates; decoding may still fail afterwards.
pub fn looks_like_time_units(units: &str) -> bool {
    units.to_ascii_lowercase().contains(" since ")
}

fn parse_reference(raw: &str) -> Option<(CalendarDateTime, i64)> {
    let mut text = raw.to_string();
    for suffix in [" utc", " gmt", "z"] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.trim_end().to_string();
            break;
        }
    }

    let (date_part, rest) = match text.find(['t', ' ']) {
        Some(idx) => (&text[..idx], text[idx + 1..].trim()),
        None => (text.as_str(), ""),
    };

    let (negative, date_body) = match date_part.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, date_part),
    };
    let mut fields = date_body.split('-');
    let year: i64 = fields.next()?.parse().ok()?;
    let month: u32 = fields.next().map_or(Some(1), |m| m.parse().ok())?;
    let day: u32 = fields.next().map_or(Some(1), |d| d.parse().ok())?;
    if fields.next().is_some() {
        return None;
    }
    let year = if negative { -year } else { year };

    let mut dt = CalendarDateTime::ymd(year, month, day);
    let mut offset_minutes = 0;

    let mut tokens = rest.split_whitespace();
    if let Some(mut time_token) = tokens.next() {
        let mut tz_token = tokens.next();
        if let Some(idx) = time_token.find(['+', '-']) {
            if idx > 0 {
                tz_token = Some(&time_token[idx..]);
                time_token = &time_token[..idx];
            }
        }
        if time_token.starts_with(['+', '-']) {
            tz_token = Some(time_token);
        } else {
            parse_clock(time_token, &mut dt)?;
        }
        if let Some(tz) = tz_token {
            offset_minutes = parse_utc_offset(tz)?;
        }
        if tokens.next().is_some() {
            return None;
        }
    }
    Some((dt, offset_minutes))
}

fn parse_clock(token: &str, dt: &mut CalendarDateTime) -> Option<()> {
    let mut parts = token.split(':');
    dt.hour = parts.next()?.parse().ok()?;
    dt.minute = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    if let Some(sec) = parts.next() {
        let (whole, frac) = sec.split_once('.').unwrap_or((sec, ""));
        dt.second = whole.parse().ok()?;
        if !frac.is_empty() {
            let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
            dt.microsecond = digits.parse().ok()?;
        }
    }
    if parts.next().is_some() || dt.hour > 23 || dt.minute > 59 || dt.second > 60 {
        return None;
    }
    Some(())
}

fn parse_utc_offset(token: &str) -> Option<i64> {
    let sign = if token.starts_with('-') { -1 } else { 1 };
    let body = token.get(1..)?;
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<i64>().ok()?, m.parse::<i64>().ok()?),
        None if body.len() == 4 => (body.get(..2)?.parse().ok()?, body.get(2..)?.parse().ok()?),
        None => (body.parse().ok()?, 0),
    };
    hours.checked_mul(60)?.checked_add(minutes)?.checked_mul(sign)
}

/// Decode one numeric offset into an instant of `calendar`.
pub fn decode_instant(
    units: &TimeUnits,
    calendar: Calendar,
    value: f64,
) -> Result<CalendarDateTime, TimeDecodeError> {
    if !value.is_finite() {
        return Err(TimeDecodeError::NonFiniteValue);
    }
    let reference = &units.reference;
    if !calendar.is_valid_date(reference.year, reference.month, reference.day) {
        return Err(TimeDecodeError::InvalidReferenceDate(reference.to_string()));
    }
    let unit_micros = units.unit.micros(calendar)?;
    let offset = (value * unit_micros).round();
    if offset.abs() >= i64::MAX as f64 {
        return Err(TimeDecodeError::OutOfRange);
    }
    let shift = units
        .utc_offset_minutes
        .checked_mul(60 * MICROS_PER_SECOND)
        .ok_or(TimeDecodeError::OutOfRange)?;
    let micros = calendar
        .timestamp(reference)?
        .checked_sub(shift)
        .ok_or(TimeDecodeError::OutOfRange)?
        .checked_add(offset as i64)
        .ok_or(TimeDecodeError::OutOfRange)?;
    calendar.from_timestamp(micros)
}

/// String-level entry point: `(units, calendar attribute, offset) -> instant`.
pub fn decode_time(
    units: &str,
    calendar: Option<&str>,
    value: f64,
) -> Result<CalendarDateTime, TimeDecodeError> {
    let calendar = Calendar::parse(calendar)?;
    let units = TimeUnits::parse(units)?;
    decode_instant(&units, calendar, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i64, m: u32, d: u32) -> CalendarDateTime {
        CalendarDateTime::ymd(y, m, d)
    }

    #[test]
    fn test_calendar_aliases() {
        assert_eq!(Calendar::parse(None).unwrap(), Calendar::Standard);
        assert_eq!(Calendar::parse(Some("Gregorian")).unwrap(), Calendar::Standard);
        assert_eq!(Calendar::parse(Some("365_day")).unwrap(), Calendar::NoLeap);
        assert_eq!(Calendar::parse(Some("366_day")).unwrap(), Calendar::AllLeap);
        assert_eq!(Calendar::parse(Some(" 360_day ")).unwrap(), Calendar::Day360);
        assert!(matches!(
            Calendar::parse(Some("none")),
            Err(TimeDecodeError::UnknownCalendar(_))
        ));
    }

    #[test]
    fn test_standard_days_since() {
        let t = decode_time("days since 2000-01-01", Some("standard"), 31.0).unwrap();
        assert_eq!(t, dt(2000, 2, 1));

        let t = decode_time("days since 2000-01-01", Some("standard"), 60.0).unwrap();
        assert_eq!(t, dt(2000, 3, 1));
    }

    #[test]
    fn test_360_day_calendar_has_february_30() {
        let t = decode_time("days since 2000-01-01", Some("360_day"), 59.0).unwrap();
        assert_eq!(t, dt(2000, 2, 30));

        let t = decode_time("days since 2000-01-01", Some("360_day"), 360.0).unwrap();
        assert_eq!(t, dt(2001, 1, 1));
    }

    #[test]
    fn test_noleap_skips_february_29() {
        let t = decode_time("days since 2000-02-28", Some("noleap"), 1.0).unwrap();
        assert_eq!(t, dt(2000, 3, 1));

        let t = decode_time("days since 2000-02-28", Some("standard"), 1.0).unwrap();
        assert_eq!(t, dt(2000, 2, 29));
    }

    #[test]
    fn test_all_leap_always_has_february_29() {
        let t = decode_time("days since 2001-02-28", Some("all_leap"), 1.0).unwrap();
        assert_eq!(t, dt(2001, 2, 29));
    }

    #[test]
    fn test_julian_century_leap_year() {
        // 1900 is a leap year in the Julian calendar but not in the Gregorian one.
        let t = decode_time("days since 1900-02-28", Some("julian"), 1.0).unwrap();
        assert_eq!(t, dt(1900, 2, 29));

        let t = decode_time("days since 1900-02-28", Some("proleptic_gregorian"), 1.0).unwrap();
        assert_eq!(t, dt(1900, 3, 1));
    }

    #[test]
    fn test_standard_calendar_gregorian_reform() {
        let t = decode_time("days since 1582-10-04", Some("standard"), 1.0).unwrap();
        assert_eq!(t, dt(1582, 10, 15));

        let t = decode_time("days since 1582-10-04", Some("proleptic_gregorian"), 1.0).unwrap();
        assert_eq!(t, dt(1582, 10, 5));
    }

    #[test]
    fn test_hours_with_time_of_day() {
        let t = decode_time("hours since 1979-01-01 00:00:00", None, 30.5).unwrap();
        assert_eq!(t, dt(1979, 1, 2).with_time(6, 30, 0));
    }

    #[test]
    fn test_negative_offsets() {
        let t = decode_time("days since 2000-01-01", Some("360_day"), -1.0).unwrap();
        assert_eq!(t, dt(1999, 12, 30));

        let t = decode_time("days since 2000-03-01", Some("noleap"), -1.0).unwrap();
        assert_eq!(t, dt(2000, 2, 28));
    }

    #[test]
    fn test_months_only_defined_for_360_day() {
        let t = decode_time("months since 2000-01-01", Some("360_day"), 13.0).unwrap();
        assert_eq!(t, dt(2001, 2, 1));

        assert!(matches!(
            decode_time("months since 2000-01-01", Some("standard"), 1.0),
            Err(TimeDecodeError::UnitNotSupported { .. })
        ));
    }

    #[test]
    fn test_reference_date_formats() {
        let units = TimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        assert_eq!(units.unit, TimeUnit::Seconds);
        assert_eq!(units.reference, dt(1970, 1, 1));

        let units = TimeUnits::parse("days since 1850-1-1 0:0:0").unwrap();
        assert_eq!(units.reference, dt(1850, 1, 1));

        let units = TimeUnits::parse("hours since 1900-01-01 00:00:00.0 UTC").unwrap();
        assert_eq!(units.reference, dt(1900, 1, 1));

        let units = TimeUnits::parse("minutes since 2000-01-01 12:00:00 +05:00").unwrap();
        assert_eq!(units.utc_offset_minutes, 300);
    }

    #[test]
    fn test_utc_offset_is_applied() {
        let t = decode_time("hours since 2000-01-01 06:00:00 +06:00", None, 0.0).unwrap();
        assert_eq!(t, dt(2000, 1, 1));
    }

    #[test]
    fn test_unrecognized_units() {
        assert!(matches!(
            decode_time("fortnights since 2000-01-01", None, 1.0),
            Err(TimeDecodeError::UnrecognizedUnits(_))
        ));
        assert!(matches!(
            decode_time("K", None, 1.0),
            Err(TimeDecodeError::UnrecognizedUnits(_))
        ));
        assert!(matches!(
            decode_time("days since yesterday", None, 1.0),
            Err(TimeDecodeError::InvalidReferenceDate(_))
        ));
    }

    #[test]
    fn test_reference_must_exist_in_calendar() {
        assert!(decode_time("days since 2001-02-30", Some("360_day"), 0.0).is_ok());
        assert!(matches!(
            decode_time("days since 2001-02-30", Some("standard"), 0.0),
            Err(TimeDecodeError::InvalidReferenceDate(_))
        ));
    }

    #[test]
    fn test_nanoseconds_since_epoch() {
        let t = decode_time(
            "nanoseconds since 1970-01-01",
            Some("proleptic_gregorian"),
            86_400_000_000_000.0,
        )
        .unwrap();
        assert_eq!(t, dt(1970, 1, 2));
    }

    #[test]
    fn test_non_finite_value() {
        assert_eq!(
            decode_time("days since 2000-01-01", None, f64::NAN),
            Err(TimeDecodeError::NonFiniteValue)
        );
    }

    #[test]
    fn test_seconds_between_respects_calendar() {
        let a = dt(2000, 2, 1);
        let b = dt(2000, 3, 1);
        let day = 86_400.0;
        assert_eq!(Calendar::Day360.seconds_between(&a, &b).unwrap(), 30.0 * day);
        assert_eq!(Calendar::NoLeap.seconds_between(&a, &b).unwrap(), 28.0 * day);
        assert_eq!(Calendar::Standard.seconds_between(&a, &b).unwrap(), 29.0 * day);
    }

    #[test]
    fn test_non_ascii_utc_offset_is_rejected() {
        assert!(matches!(
            TimeUnits::parse("hours since 2000-01-01 00:00 +1é1"),
            Err(TimeDecodeError::InvalidReferenceDate(_))
        ));
        assert!(TimeUnits::parse("hours since 2000-01-01 00:00 +99999999999999999").is_err());
    }

    #[test]
    fn test_extreme_reference_years_are_out_of_range() {
        for calendar in ["360_day", "noleap", "all_leap", "julian", "standard"] {
            assert_eq!(
                decode_time("days since 99999999999999999-01-01", Some(calendar), 0.0),
                Err(TimeDecodeError::OutOfRange),
                "{}",
                calendar
            );
        }
        assert_eq!(
            decode_time("days since -9000000000000000000-01-01", Some("julian"), 0.0),
            Err(TimeDecodeError::OutOfRange)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(dt(850, 1, 1).to_string(), "0850-01-01 00:00:00");
        let mut t = dt(2000, 2, 30).with_time(12, 0, 0);
        t.microsecond = 500_000;
        assert_eq!(t.to_string(), "2000-02-30 12:00:00.500000");
    }
}
