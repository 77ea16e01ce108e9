//! Calendar-date handling.
//!
//! Business dates are calendar values: "the 10th of September", not an
//! instant. They are parsed component by component from the text the user
//! typed, stored as `YYYY-MM-DD` and displayed as `DD/MM/YYYY`. Nothing in
//! this module consults the process's local timezone. The only place an
//! offset matters is "today", which is taken in the fixed [`DisplayZone`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use time::{macros::{format_description, offset}, Date, Month, OffsetDateTime, Time, UtcOffset};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("date is required")]
    Empty,
    #[error("expected 3 date components (year, month, day), found {found}")]
    WrongComponentCount { found: usize },
    #[error("malformed date: {0}")]
    Malformed(String),
    #[error("date out of range: {0}")]
    OutOfRange(String),
    #[error("invalid UTC offset: {0}")]
    InvalidOffset(String),
}

/// A date with no time-of-day and no offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(Date);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self, DateError> {
        let m = Month::try_from(month)
            .map_err(|_| DateError::OutOfRange(format!("month {} in {:04}-{:02}-{:02}", month, year, month, day)))?;
        Date::from_calendar_date(year, m, day)
            .map(CalendarDate)
            .map_err(|_| DateError::OutOfRange(format!("{:04}-{:02}-{:02}", year, month, day)))
    }

    /// Parses a user-supplied date.
    ///
    /// Accepts the canonical `YYYY-MM-DD`, the same followed by `T` or a space
    /// and a time of day (with optional fraction and offset), and the display
    /// form `DD/MM/YYYY`. The time of day and any offset are dropped: the date
    /// that was written is the date that is kept.
    pub fn parse(input: &str) -> Result<Self, DateError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(DateError::Empty);
        }

        if text.contains('/') {
            return Self::parse_display(text);
        }

        let (date_part, time_part) = match text.find(|c: char| c == 'T' || c == 't' || c == ' ') {
            Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
            None => (text, None),
        };

        if let Some(time_part) = time_part {
            check_time_of_day(time_part, text)?;
        }

        let parts: Vec<&str> = date_part.split('-').collect();
        if parts.len() != 3 {
            return Err(DateError::WrongComponentCount { found: parts.len() });
        }

        let year = component(parts[0], 4, 4, "year", text)?;
        let month = component(parts[1], 2, 2, "month", text)?;
        let day = component(parts[2], 2, 2, "day", text)?;
        Self::from_ymd(year as i32, month as u8, day as u8)
    }

    fn parse_display(text: &str) -> Result<Self, DateError> {
        let parts: Vec<&str> = text.split('/').collect();
        if parts.len() != 3 {
            return Err(DateError::WrongComponentCount { found: parts.len() });
        }

        let day = component(parts[0], 1, 2, "day", text)?;
        let month = component(parts[1], 1, 2, "month", text)?;
        let year = component(parts[2], 4, 4, "year", text)?;
        Self::from_ymd(year as i32, month as u8, day as u8)
    }

    /// Decodes a value read back from storage. Only the canonical form is
    /// accepted here; anything else means the row is damaged.
    pub fn from_storage(text: &str) -> Result<Self, DateError> {
        if text.len() != 10 {
            return Err(DateError::Malformed(format!("stored date '{}' is not YYYY-MM-DD", text)));
        }
        Self::parse(text)
    }

    pub fn to_storage_string(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.0.year(), self.0.month() as u8, self.0.day())
    }

    pub fn to_display_string(&self) -> String {
        format!("{:02}/{:02}/{:04}", self.0.day(), self.0.month() as u8, self.0.year())
    }

    pub fn as_date(&self) -> Date {
        self.0
    }

    pub fn next_day(&self) -> Option<Self> {
        self.0.next_day().map(CalendarDate)
    }
}

fn component(part: &str, min_len: usize, max_len: usize, name: &str, whole: &str) -> Result<u32, DateError> {
    if part.len() < min_len || part.len() > max_len || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::Malformed(format!("{} component '{}' in '{}'", name, part, whole)));
    }
    part.parse::<u32>()
        .map_err(|_| DateError::Malformed(format!("{} component '{}' in '{}'", name, part, whole)))
}

// The time of day is validated and then dropped.
fn check_time_of_day(part: &str, whole: &str) -> Result<(), DateError> {
    let malformed = || DateError::Malformed(format!("unrecognised time of day in '{}'", whole));
    let clock = strip_offset(part).ok_or_else(malformed)?;
    let accepted = [
        format_description!("[hour]:[minute]"),
        format_description!("[hour]:[minute]:[second]"),
        format_description!("[hour]:[minute]:[second].[subsecond]"),
    ];
    if accepted.iter().any(|format| Time::parse(clock, *format).is_ok()) {
        Ok(())
    } else {
        Err(malformed())
    }
}

/// Removes a trailing `Z`, `+HH:MM` or `-HH:MM`. `None` if the suffix is not a valid offset.
fn strip_offset(part: &str) -> Option<&str> {
    if let Some(clock) = part.strip_suffix('Z').or_else(|| part.strip_suffix('z')) {
        return Some(clock);
    }
    match part.rfind(|c: char| c == '+' || c == '-') {
        Some(idx) => {
            UtcOffset::parse(&part[idx..], format_description!("[offset_hour sign:mandatory]:[offset_minute]")).ok()?;
            Some(&part[..idx])
        }
        None => Some(part),
    }
}

impl From<Date> for CalendarDate {
    fn from(date: Date) -> Self {
        CalendarDate(date)
    }
}

impl From<CalendarDate> for Date {
    fn from(date: CalendarDate) -> Self {
        date.0
    }
}

impl FromStr for CalendarDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CalendarDate::parse(s)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_string())
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_storage_string())
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CalendarDate::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The fixed timezone used for "today" and for rendering instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayZone {
    offset: UtcOffset,
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::SAO_PAULO
    }
}

impl DisplayZone {
    /// America/Sao_Paulo, which has not observed daylight saving since 2019.
    pub const SAO_PAULO: DisplayZone = DisplayZone::new(offset!(-3));

    pub const fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// Parses `-03:00`, `+09:00`, `Z` or `UTC`.
    pub fn parse(text: &str) -> Result<Self, DateError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("utc") || text.eq_ignore_ascii_case("z") {
            return Ok(Self::new(UtcOffset::UTC));
        }
        UtcOffset::parse(text, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
            .map(Self::new)
            .map_err(|e| DateError::InvalidOffset(format!("'{}': {}", text, e)))
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn today(&self) -> CalendarDate {
        self.today_at(OffsetDateTime::now_utc())
    }

    pub fn today_at(&self, instant: OffsetDateTime) -> CalendarDate {
        CalendarDate(instant.to_offset(self.offset).date())
    }

    /// `HH:MM:SS` of an instant, as seen in this zone.
    pub fn format_time(&self, instant: OffsetDateTime) -> String {
        let local = instant.to_offset(self.offset);
        format!("{:02}:{:02}:{:02}", local.hour(), local.minute(), local.second())
    }

    /// Empty or absent input means today in this zone; anything else must parse.
    pub fn normalize(&self, input: Option<&str>) -> Result<CalendarDate, DateError> {
        self.normalize_at(input, OffsetDateTime::now_utc())
    }

    pub fn normalize_at(&self, input: Option<&str>, now: OffsetDateTime) -> Result<CalendarDate, DateError> {
        match input.map(str::trim) {
            None | Some("") => Ok(self.today_at(now)),
            Some(text) => CalendarDate::parse(text),
        }
    }
}
