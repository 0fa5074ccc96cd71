//! Domain primitives: TimeMs, MerchantId, PayoutMonth.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Wall-clock minute this instant falls in (floor division, so times
    /// before the epoch still bucket correctly).
    pub fn minute_bucket(&self) -> i64 {
        self.0.div_euclid(60_000)
    }
}

/// Merchant identifier exactly as it appeared in the source.
///
/// Kept as an opaque string: `"007123"` and `"7123"` are different merchants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantId(String);

impl MerchantId {
    pub fn new(id: impl Into<String>) -> Self {
        MerchantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid payout month {0:?}: expected YYYY-MM")]
pub struct PayoutMonthParseError(pub String);

/// Reporting month in `YYYY-MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayoutMonth {
    year: i32,
    month: u32,
}

impl PayoutMonth {
    pub fn of(date: NaiveDate) -> Self {
        PayoutMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(Utc::now().date_naive())
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }
}

impl FromStr for PayoutMonth {
    type Err = PayoutMonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || PayoutMonthParseError(s.to_string());
        let (year, month) = trimmed.split_once('-').ok_or_else(err)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(err());
        }
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        if !(1..=12).contains(&month) {
            return Err(err());
        }
        Ok(PayoutMonth { year, month })
    }
}

impl fmt::Display for PayoutMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for PayoutMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PayoutMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
