// src/core/version.rs

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^\s*v?(\d+(?:\.\d+)*)\s*$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("'{0}' is not a valid version (expected something like '1.4' or '2.0.3').")]
    Malformed(String),
    #[error("Version component '{0}' is out of range.")]
    ComponentOutOfRange(String),
}

/// A dotted numeric version. Missing trailing components compare as zero,
/// so `1.2` and `1.2.0` are equal.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    pub fn new(parts: impl Into<Vec<u64>>) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionError::Malformed(s.to_string()))?;
        let digits = caps.get(1).map_or("", |m| m.as_str());

        let parts = digits
            .split('.')
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| VersionError::ComponentOutOfRange(p.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&text.join("."))
    }
}

/// The versions in which a command, parameter or setting is available:
/// from `since` (inclusive) up to `deprecated` (exclusive).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
    pub since: Option<Version>,
    pub deprecated: Option<Version>,
}

impl VersionRange {
    /// Parses the optional bounds of a declaration.
    pub fn parse(since: Option<&str>, deprecated: Option<&str>) -> Result<Self, VersionError> {
        Ok(Self {
            since: since.map(str::parse).transpose()?,
            deprecated: deprecated.map(str::parse).transpose()?,
        })
    }

    pub fn applies_to(&self, version: &Version) -> bool {
        let after_start = self.since.as_ref().is_none_or(|since| since <= version);
        let before_end = self.deprecated.as_ref().is_none_or(|end| version < end);
        after_start && before_end
    }

    /// Like [`applies_to`](Self::applies_to), but everything applies when no
    /// target version is configured.
    pub fn applies_to_target(&self, target: Option<&Version>) -> bool {
        target.is_none_or(|v| self.applies_to(v))
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.deprecated.is_none()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.since, &self.deprecated) {
            (None, None) => f.write_str("all versions"),
            (Some(s), None) => write!(f, "since {}", s),
            (None, Some(d)) => write!(f, "deprecated in {}", d),
            (Some(s), Some(d)) => write!(f, "since {}, deprecated in {}", s, d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_compare_versions() {
        assert_eq!(v("1.2"), v("1.2.0"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("v2") > v("1.99.99"));
        assert_eq!(v(" 3.1 ").to_string(), "3.1");
    }

    #[test]
    fn test_malformed_versions_are_rejected() {
        assert!(matches!("1..2".parse::<Version>(), Err(VersionError::Malformed(_))));
        assert!(matches!("abc".parse::<Version>(), Err(VersionError::Malformed(_))));
        assert!(matches!(
            "99999999999999999999999".parse::<Version>(),
            Err(VersionError::ComponentOutOfRange(_))
        ));
    }

    #[test]
    fn test_range_bounds_are_half_open() {
        let range = VersionRange::parse(Some("1.2"), Some("2.0")).unwrap();
        assert!(!range.applies_to(&v("1.1.9")));
        assert!(range.applies_to(&v("1.2")));
        assert!(range.applies_to(&v("1.99")));
        assert!(!range.applies_to(&v("2.0")));

        assert!(VersionRange::default().applies_to(&v("0.0.1")));
        assert!(range.applies_to_target(None));
    }
}
