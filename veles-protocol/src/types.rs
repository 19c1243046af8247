//! Names, timestamps and shared protocol constants

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 100% expressed in basis points; vote weights and percent parameters use
/// this scale.
pub const PERCENT_100: i16 = 10_000;

/// Account name: 3..=16 chars of `a-z`, `0-9`, `-` or `.`, starting with a
/// letter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountName(String);

impl AccountName {
    /// Validate and wrap a name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid_account_name(&name) {
            return Err(Error::InvalidValue(format!("Bad account name: {name}")));
        }
        Ok(Self(name))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Smallest value in the name ordering. Not a valid name; only useful as
    /// the lower bound of a keyed range scan.
    pub fn floor() -> Self {
        Self(String::new())
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account-name validity rule shared by evaluators and tooling
pub fn is_valid_account_name(name: &str) -> bool {
    let len_ok = (3..=16).contains(&name.len());
    let chars_ok = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    let starts_ok = name.bytes().next().is_some_and(|b| b.is_ascii_lowercase());
    len_ok && chars_ok && starts_ok
}

/// Second-granularity timestamp, the chain's only notion of time.
///
/// All comparisons and arithmetic stay in whole seconds so replay is exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TimePointSec(pub i64);

impl TimePointSec {
    /// The epoch
    pub const ZERO: TimePointSec = TimePointSec(0);

    /// Unreachable sentinel, sorts after every real timestamp
    pub const MAX: TimePointSec = TimePointSec(i64::MAX);

    /// Seconds since the epoch
    pub fn secs(&self) -> i64 {
        self.0
    }

    /// This timestamp plus `secs` seconds, saturating at the sentinel
    pub fn plus_secs(&self, secs: i64) -> TimePointSec {
        TimePointSec(self.0.saturating_add(secs))
    }

    /// Whole seconds elapsed since `earlier` (zero if `earlier` is later)
    pub fn secs_since(&self, earlier: TimePointSec) -> i64 {
        (self.0 - earlier.0).max(0)
    }

    /// Conversion for display/logging only
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0, 0).single()
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            None => write!(f, "@{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_rules() {
        assert!(AccountName::new("alice").is_ok());
        assert!(AccountName::new("bob-1.a").is_ok());
        assert!(AccountName::new("ab").is_err());
        assert!(AccountName::new("1alice").is_err());
        assert!(AccountName::new("Alice").is_err());
        assert!(AccountName::new("a-very-long-account-name").is_err());
    }

    #[test]
    fn test_time_point_arithmetic() {
        let t = TimePointSec(1_000);
        assert_eq!(t.plus_secs(500), TimePointSec(1_500));
        assert_eq!(TimePointSec(1_500).secs_since(t), 500);
        assert_eq!(t.secs_since(TimePointSec(1_500)), 0);
        assert_eq!(TimePointSec::MAX.plus_secs(1), TimePointSec::MAX);
    }

    #[test]
    fn test_time_point_display() {
        assert_eq!(TimePointSec(0).to_string(), "1970-01-01T00:00:00");
    }
}
