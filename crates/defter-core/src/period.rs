//! Fiscal period identifiers (`"<year>-Q<1..4>"`) and their calendar ranges.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A fiscal quarter such as `2025-Q2`.
///
/// Parsing is strict on shape and lenient on surrounding whitespace and the
/// case of the `Q`. Display always renders the canonical `YYYY-Qn` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodId {
    year: i32,
    quarter: u8,
}

impl PeriodId {
    /// Create a period, validating the quarter number.
    pub fn new(year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(Error::Validation(format!(
                "quarter must be 1..4, got {}",
                quarter
            )));
        }
        if !(1900..=9999).contains(&year) {
            return Err(Error::Validation(format!("year out of range: {}", year)));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    /// First calendar day of the quarter.
    pub fn start(&self) -> NaiveDate {
        let month = u32::from(self.quarter - 1) * 3 + 1;
        NaiveDate::from_ymd_opt(self.year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the quarter.
    pub fn end(&self) -> NaiveDate {
        let next = if self.quarter == 4 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, u32::from(self.quarter) * 3 + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }

    /// Whether a date falls inside the quarter (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    /// `YYYY-MM-DD..YYYY-MM-DD` rendering used in time-shield reasons.
    pub fn range_label(&self) -> String {
        format!("{}..{}", self.start(), self.end())
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

impl FromStr for PeriodId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::Validation(format!("malformed period id: {:?}", s));
        let trimmed = s.trim();
        let (year, quarter) = trimmed.split_once('-').ok_or_else(malformed)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let quarter = quarter
            .strip_prefix('Q')
            .or_else(|| quarter.strip_prefix('q'))
            .ok_or_else(malformed)?;
        if quarter.len() != 1 {
            return Err(malformed());
        }
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let quarter: u8 = quarter.parse().map_err(|_| malformed())?;
        Self::new(year, quarter).map_err(|_| malformed())
    }
}

impl TryFrom<String> for PeriodId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeriodId> for String {
    fn from(value: PeriodId) -> Self {
        value.to_string()
    }
}
