use crate::error::{ReportError, ReportResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A cell value as it moves between workbooks. Formatting never travels with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Spreadsheet error literal such as `#N/A`
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// 24-hour `H:MM` time of day from configuration, e.g. `7:00` or `19:30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub const DEFAULT_START: TimeOfDay = TimeOfDay { hour: 7, minute: 0 };
    pub const DEFAULT_END: TimeOfDay = TimeOfDay { hour: 19, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> ReportResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(ReportError::Config(format!(
                "time of day out of range: {}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn as_naive(&self) -> NaiveTime {
        // Range checked in new()
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReportError::Config(format!("expected H:MM time of day, got '{}'", s));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hour, self.minute)
    }
}

/// The calendar day being reported on, always tied to the configured zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessDate {
    date: NaiveDate,
    tz: Tz,
}

impl BusinessDate {
    pub fn new(date: NaiveDate, tz: Tz) -> Self {
        Self { date, tz }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn next_day(&self) -> ReportResult<Self> {
        self.offset_days(1)
    }

    pub fn previous_day(&self) -> ReportResult<Self> {
        self.offset_days(-1)
    }

    fn offset_days(&self, days: i64) -> ReportResult<Self> {
        let date = self
            .date
            .checked_add_signed(Duration::days(days))
            .ok_or_else(|| ReportError::Date(format!("{} {:+} days is out of range", self, days)))?;
        Ok(Self::new(date, self.tz))
    }

    /// Six-digit `MMDDYY` token used in workbook file names.
    pub fn token(&self) -> String {
        self.date.format("%m%d%y").to_string()
    }

    /// Local instant of `time` on this date. Ambiguous local times (DST fall-back)
    /// take the earlier instant; skipped local times are an error.
    pub fn at(&self, time: TimeOfDay) -> ReportResult<DateTime<Tz>> {
        let naive = self.date.and_time(time.as_naive());
        self.tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
            ReportError::Date(format!(
                "{} {} does not exist in {}",
                self.date,
                time,
                self.tz.name()
            ))
        })
    }
}

impl fmt::Display for BusinessDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))
    }
}

/// Half-open interval `[start, end)` handed to the export tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl ExportWindow {
    pub const ISO_FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S%z";

    pub fn for_date(date: BusinessDate, start: TimeOfDay, end: TimeOfDay) -> ReportResult<Self> {
        let start = date.at(start)?;
        let end = date.at(end)?;
        if end <= start {
            return Err(ReportError::Config(format!(
                "export window end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start_iso(&self) -> String {
        self.start.format(Self::ISO_FORMAT).to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format(Self::ISO_FORMAT).to_string()
    }
}

impl fmt::Display for ExportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_iso(), self.end_iso())
    }
}
