//! Interval notation for dependency version constraints.
//!
//! | Text | Meaning |
//! |---|---|
//! | `1.0` | `1.0 <= x` |
//! | `(1.0,)` | `1.0 < x` |
//! | `[1.0]` | `x == 1.0` |
//! | `(,1.0]` | `x <= 1.0` |
//! | `(,1.0)` | `x < 1.0` |
//! | `[1.0,2.0]` | `1.0 <= x <= 2.0` |
//! | `(1.0,2.0)` | `1.0 < x < 2.0` |
//! | `[1.0,2.0)` | `1.0 <= x < 2.0` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::version::PackageVersion;

/// Errors produced by [`VersionRange::parse`].
///
/// Every variant carries the literal text that was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    /// The input was empty or whitespace.
    #[error("version range is empty")]
    Empty,

    /// Bracket notation needs at least three characters.
    #[error("'{text}' is too short to be a version range")]
    TooShort {
        /// The rejected text.
        text: String,
    },

    /// The range does not start with `[`/`(` or end with `]`/`)`.
    #[error("'{text}' must start with '[' or '(' and end with ']' or ')'")]
    InvalidBracket {
        /// The rejected text.
        text: String,
    },

    /// More than one `,` separator.
    #[error("'{text}' has more than one ',' separator")]
    TooManyCommas {
        /// The rejected text.
        text: String,
    },

    /// A bound could not be parsed as a version.
    #[error("'{token}' in version range '{text}' is not a valid version")]
    InvalidVersion {
        /// The rejected text.
        text: String,
        /// The bound that failed to parse.
        token: String,
    },

    /// A single bracketed value must use `[v]`.
    #[error("'{text}' is an exact-match range and must use inclusive brackets")]
    ExactMatchNotInclusive {
        /// The rejected text.
        text: String,
    },
}

/// A version interval with optional, independently inclusive bounds.
///
/// An absent bound is always stored as exclusive so that two ranges that
/// describe the same interval compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<PackageVersion>,
    min_inclusive: bool,
    max: Option<PackageVersion>,
    max_inclusive: bool,
}

impl VersionRange {
    /// Create a range from its bounds.
    pub fn new(
        min: Option<PackageVersion>,
        min_inclusive: bool,
        max: Option<PackageVersion>,
        max_inclusive: bool,
    ) -> Self {
        Self {
            min_inclusive: min_inclusive && min.is_some(),
            max_inclusive: max_inclusive && max.is_some(),
            min,
            max,
        }
    }

    /// `version <= x`, the meaning of a plain version string.
    pub fn at_least(version: PackageVersion) -> Self {
        Self::new(Some(version), true, None, false)
    }

    /// `x == version`.
    pub fn exact(version: PackageVersion) -> Self {
        Self::new(Some(version.clone()), true, Some(version), true)
    }

    /// Lower bound.
    pub fn min(&self) -> Option<&PackageVersion> {
        self.min.as_ref()
    }

    /// Whether the lower bound is part of the interval.
    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    /// Upper bound.
    pub fn max(&self) -> Option<&PackageVersion> {
        self.max.as_ref()
    }

    /// Whether the upper bound is part of the interval.
    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    /// Parse interval notation or a plain version.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeParseError`] naming the offending text when the
    /// brackets are wrong, there is more than one comma, a bound is not a
    /// version, or a single value is not written as `[v]`.
    pub fn parse(text: &str) -> Result<Self, RangeParseError> {
        let value = text.trim();
        if value.is_empty() {
            return Err(RangeParseError::Empty);
        }

        if let Some(version) = PackageVersion::try_parse(value) {
            return Ok(Self::at_least(version));
        }

        if value.len() < 3 {
            return Err(RangeParseError::TooShort {
                text: value.to_string(),
            });
        }

        let min_inclusive = match value.as_bytes()[0] {
            b'[' => true,
            b'(' => false,
            _ => {
                return Err(RangeParseError::InvalidBracket {
                    text: value.to_string(),
                });
            }
        };
        let max_inclusive = if value.ends_with(']') {
            true
        } else if value.ends_with(')') {
            false
        } else {
            return Err(RangeParseError::InvalidBracket {
                text: value.to_string(),
            });
        };

        let inner = &value[1..value.len() - 1];
        let bounds: Vec<&str> = inner.split(',').map(str::trim).collect();

        let parse_bound = |token: &str| -> Result<Option<PackageVersion>, RangeParseError> {
            if token.is_empty() {
                return Ok(None);
            }
            PackageVersion::try_parse(token)
                .map(Some)
                .ok_or_else(|| RangeParseError::InvalidVersion {
                    text: value.to_string(),
                    token: token.to_string(),
                })
        };

        match bounds.as_slice() {
            [single] => {
                if !(min_inclusive && max_inclusive) {
                    return Err(RangeParseError::ExactMatchNotInclusive {
                        text: value.to_string(),
                    });
                }
                let version = PackageVersion::try_parse(*single).ok_or_else(|| {
                    RangeParseError::InvalidVersion {
                        text: value.to_string(),
                        token: (*single).to_string(),
                    }
                })?;
                Ok(Self::exact(version))
            }
            [min, max] => Ok(Self::new(
                parse_bound(*min)?,
                min_inclusive,
                parse_bound(*max)?,
                max_inclusive,
            )),
            _ => Err(RangeParseError::TooManyCommas {
                text: value.to_string(),
            }),
        }
    }

    /// Parse, returning `None` on any failure.
    pub fn try_parse(text: &str) -> Option<Self> {
        Self::parse(text).ok()
    }

    /// Whether no version can satisfy this range: `max < min`, or equal bounds
    /// where either side is exclusive.
    pub fn is_empty_interval(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => {
                max < min || (min == max && !(self.min_inclusive && self.max_inclusive))
            }
            _ => false,
        }
    }

    /// Whether `version` lies inside the interval.
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), None) if self.min_inclusive => write!(f, "{min}"),
            (Some(min), Some(max)) if min == max && self.min_inclusive && self.max_inclusive => {
                write!(f, "[{min}]")
            }
            _ => {
                f.write_str(if self.min_inclusive { "[" } else { "(" })?;
                if let Some(min) = &self.min {
                    write!(f, "{min}")?;
                }
                f.write_str(", ")?;
                if let Some(max) = &self.max {
                    write!(f, "{max}")?;
                }
                f.write_str(if self.max_inclusive { "]" } else { ")" })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn test_plain_version_is_inclusive_minimum() {
        let range = VersionRange::parse("1.2").unwrap();
        assert_eq!(range.min(), Some(&v("1.2")));
        assert!(range.is_min_inclusive());
        assert_eq!(range.max(), None);
        assert_eq!(range.to_string(), "1.2");
    }

    #[test]
    fn test_exact_match() {
        let range = VersionRange::parse("[1.0]").unwrap();
        assert_eq!(range, VersionRange::exact(v("1.0")));
        assert_eq!(range.to_string(), "[1.0]");
        assert!(range.satisfies(&v("1.0.0")));
        assert!(!range.satisfies(&v("1.0.1")));
    }

    #[test]
    fn test_bracket_bounds() {
        let range = VersionRange::parse("[1.0, 2.0)").unwrap();
        assert_eq!(range.min(), Some(&v("1.0")));
        assert!(range.is_min_inclusive());
        assert_eq!(range.max(), Some(&v("2.0")));
        assert!(!range.is_max_inclusive());
        assert!(range.satisfies(&v("1.5")));
        assert!(!range.satisfies(&v("2.0")));
        assert_eq!(range.to_string(), "[1.0, 2.0)");
    }

    #[test]
    fn test_unbounded_sides() {
        let upper = VersionRange::parse("(,1.0]").unwrap();
        assert_eq!(upper.min(), None);
        assert!(!upper.is_min_inclusive());
        assert_eq!(upper.to_string(), "(, 1.0]");

        let lower = VersionRange::parse("(1.0,)").unwrap();
        assert_eq!(lower.to_string(), "(1.0, )");
        assert!(!lower.satisfies(&v("1.0")));
        assert!(lower.satisfies(&v("1.0.1")));
    }

    #[test]
    fn test_inclusive_flag_on_absent_bound_is_dropped() {
        assert_eq!(
            VersionRange::parse("[,2.0]").unwrap(),
            VersionRange::parse("(,2.0]").unwrap()
        );
        assert_eq!(
            VersionRange::parse("[1.0,]").unwrap(),
            VersionRange::parse("1.0").unwrap()
        );
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(VersionRange::parse("  "), Err(RangeParseError::Empty));
        assert!(matches!(
            VersionRange::parse("[1"),
            Err(RangeParseError::TooShort { .. })
        ));
        assert!(matches!(
            VersionRange::parse("{1.0,2.0]"),
            Err(RangeParseError::InvalidBracket { .. })
        ));
        assert!(matches!(
            VersionRange::parse("[1.0,2.0}"),
            Err(RangeParseError::InvalidBracket { .. })
        ));
        assert!(matches!(
            VersionRange::parse("[1.0,2.0,3.0]"),
            Err(RangeParseError::TooManyCommas { .. })
        ));
        assert!(matches!(
            VersionRange::parse("(1.0)"),
            Err(RangeParseError::ExactMatchNotInclusive { .. })
        ));
        assert_eq!(
            VersionRange::parse("[1.0,beta]"),
            Err(RangeParseError::InvalidVersion {
                text: "[1.0,beta]".to_string(),
                token: "beta".to_string(),
            })
        );
        assert!(VersionRange::try_parse("not-a-range").is_none());
    }

    #[test]
    fn test_error_message_names_literal() {
        let err = VersionRange::parse("[1.0,2.0,3.0]").unwrap_err();
        assert!(err.to_string().contains("[1.0,2.0,3.0]"));
    }

    #[test]
    fn test_empty_interval_detection() {
        assert!(VersionRange::parse("(1.0,1.0)").unwrap().is_empty_interval());
        assert!(VersionRange::parse("[1.0,1.0)").unwrap().is_empty_interval());
        assert!(VersionRange::parse("[2.0,1.0]").unwrap().is_empty_interval());
        assert!(!VersionRange::parse("[1.0,1.0]").unwrap().is_empty_interval());
        assert!(!VersionRange::parse("(,1.0)").unwrap().is_empty_interval());
    }
}
