//! Business date resolution
//!
//! Templates carry their own date in the file name (`3895th_070124.xlsx`), so an
//! unattended run can derive the next report date from the template it was
//! handed. Explicit dates win, for backfills.

use crate::config::NamingScheme;
use crate::error::{ReportError, ReportResult};
use crate::types::BusinessDate;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// What to fall back to when neither an explicit date nor a template date exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Yesterday,
    Today,
}

/// Where a resolved target date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Explicit,
    /// Day after the date embedded in the template name
    Template(BusinessDate),
    Fallback(Fallback),
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSource::Explicit => write!(f, "explicit"),
            DateSource::Template(d) => write!(f, "template date {} + 1 day", d),
            DateSource::Fallback(Fallback::Yesterday) => write!(f, "yesterday"),
            DateSource::Fallback(Fallback::Today) => write!(f, "today"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: BusinessDate,
    pub source: DateSource,
}

#[derive(Debug, Clone)]
pub struct DateResolver {
    tz: Tz,
    pattern: Regex,
}

impl DateResolver {
    pub fn new(tz: Tz, naming: &NamingScheme) -> ReportResult<Self> {
        let pattern = format!(
            r"{}_(\d{{6}})\.{}",
            regex::escape(&naming.prefix),
            regex::escape(&naming.extension)
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| ReportError::Config(format!("invalid naming pattern: {}", e)))?;
        Ok(Self { tz, pattern })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Date embedded in a template file name. Only the base name is inspected.
    /// Returns `None` (with a warning) when the name does not match or the
    /// digits are not a real date.
    pub fn extract_date(&self, path: &Path) -> Option<BusinessDate> {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let Some(caps) = self.pattern.captures(&name) else {
            warn!(file = %path.display(), "Could not extract date from filename");
            return None;
        };
        let token = &caps[1];
        match parse_token(token) {
            Some(date) => Some(BusinessDate::new(date, self.tz)),
            None => {
                warn!(file = %path.display(), token, "Filename date token is not a valid date");
                None
            }
        }
    }

    pub fn today(&self) -> BusinessDate {
        self.today_from(Utc::now())
    }

    pub fn today_from(&self, now: DateTime<Utc>) -> BusinessDate {
        BusinessDate::new(now.with_timezone(&self.tz).date_naive(), self.tz)
    }

    pub fn yesterday(&self) -> ReportResult<BusinessDate> {
        self.yesterday_from(Utc::now())
    }

    /// Calendar day before `now`'s date in the configured zone.
    pub fn yesterday_from(&self, now: DateTime<Utc>) -> ReportResult<BusinessDate> {
        self.today_from(now).previous_day()
    }

    /// Explicit date, else template date + 1, else `fallback`.
    pub fn resolve_target(
        &self,
        explicit: Option<NaiveDate>,
        template: &Path,
        fallback: Fallback,
    ) -> ReportResult<ResolvedDate> {
        self.resolve_target_at(explicit, template, fallback, Utc::now())
    }

    pub fn resolve_target_at(
        &self,
        explicit: Option<NaiveDate>,
        template: &Path,
        fallback: Fallback,
        now: DateTime<Utc>,
    ) -> ReportResult<ResolvedDate> {
        if let Some(date) = explicit {
            let date = BusinessDate::new(date, self.tz);
            info!(target_date = %date, "Using provided target date");
            return Ok(ResolvedDate {
                date,
                source: DateSource::Explicit,
            });
        }

        if let Some(template_date) = self.extract_date(template) {
            let date = template_date.next_day()?;
            info!(
                template_date = %template_date,
                target_date = %date,
                "Using date from template filename"
            );
            return Ok(ResolvedDate {
                date,
                source: DateSource::Template(template_date),
            });
        }

        let date = match fallback {
            Fallback::Yesterday => self.yesterday_from(now)?,
            Fallback::Today => self.today_from(now),
        };
        warn!(
            target_date = %date,
            fallback = ?fallback,
            "Could not extract date from template, using fallback"
        );
        Ok(ResolvedDate {
            date,
            source: DateSource::Fallback(fallback),
        })
    }
}

/// `MMDDYY` with the year taken as 20YY.
fn parse_token(token: &str) -> Option<NaiveDate> {
    if token.len() != 6 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = token[0..2].parse().ok()?;
    let day: u32 = token[2..4].parse().ok()?;
    let year: i32 = token[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}
