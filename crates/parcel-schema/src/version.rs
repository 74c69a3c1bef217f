//! Package version numbers.
//!
//! A package version is `major.minor[.patch[.revision]]` with an optional
//! prerelease label (`1.0.0-beta2`). Labels follow the semver prerelease
//! identifier rules, so ordering and validation are delegated to
//! [`semver::Prerelease`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::Prerelease;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Returned when a string is not a valid [`PackageVersion`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{text}' is not a valid version string")]
pub struct VersionParseError {
    text: String,
}

impl VersionParseError {
    /// The literal text that failed to parse.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A package version with up to four numeric components and an optional
/// prerelease label.
///
/// Missing components compare as zero, so `1.0` and `1.0.0` are equal. The
/// original spelling is kept for display.
///
/// ```
/// use parcel_schema::PackageVersion;
///
/// let v: PackageVersion = "2.1-rc1".parse().unwrap();
/// assert!(v.is_prerelease());
/// assert_eq!(v.to_string(), "2.1-rc1");
/// assert!(v < "2.1".parse().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct PackageVersion {
    parts: [u64; 4],
    label: Prerelease,
    original: String,
}

impl PackageVersion {
    /// Create a release version `major.minor.patch`.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            parts: [major, minor, patch, 0],
            label: Prerelease::EMPTY,
            original: format!("{major}.{minor}.{patch}"),
        }
    }

    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError`] when the text has no numeric part, more
    /// than four components, a non-numeric component, or an invalid label.
    pub fn parse(text: &str) -> Result<Self, VersionParseError> {
        Self::try_parse(text).ok_or_else(|| VersionParseError {
            text: text.to_string(),
        })
    }

    /// Parse a version string, returning `None` on failure.
    pub fn try_parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let (numeric, label) = match trimmed.split_once('-') {
            Some((numeric, label)) => (numeric, Some(label)),
            None => (trimmed, None),
        };

        let mut parts = [0u64; 4];
        let mut count = 0;
        for component in numeric.split('.') {
            let component = component.trim();
            if count == parts.len()
                || component.is_empty()
                || !component.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            parts[count] = component.parse().ok()?;
            count += 1;
        }

        let label = match label {
            Some("") => return None,
            Some(label) => Prerelease::new(label).ok()?,
            None => Prerelease::EMPTY,
        };

        Some(Self {
            parts,
            label,
            original: trimmed.to_string(),
        })
    }

    /// The major component.
    pub fn major(&self) -> u64 {
        self.parts[0]
    }

    /// The minor component.
    pub fn minor(&self) -> u64 {
        self.parts[1]
    }

    /// Whether the version carries a prerelease label.
    pub fn is_prerelease(&self) -> bool {
        !self.label.is_empty()
    }

    /// The prerelease label, if any.
    pub fn label(&self) -> Option<&str> {
        (!self.label.is_empty()).then(|| self.label.as_str())
    }

    /// The version exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
        self.label.as_str().hash(state);
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
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
    fn test_parse_components() {
        assert_eq!(v("1.2.3.4").parts, [1, 2, 3, 4]);
        assert_eq!(v("1").parts, [1, 0, 0, 0]);
        assert_eq!(v(" 2.5 ").as_str(), "2.5");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PackageVersion::try_parse("").is_none());
        assert!(PackageVersion::try_parse("1.2.3.4.5").is_none());
        assert!(PackageVersion::try_parse("1.a").is_none());
        assert!(PackageVersion::try_parse("1..2").is_none());
        assert!(PackageVersion::try_parse("1.0-").is_none());
        assert!(PackageVersion::try_parse("1.0-beta!").is_none());
    }

    #[test]
    fn test_missing_components_compare_as_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1.0.0"), v("1.0.0.0"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0-alpha") < v("1.0"));
        assert!(v("1.0-alpha") < v("1.0-beta"));
        assert!(v("1.0-beta") < v("1.0.1-alpha"));
        assert_eq!(v("1.0-beta").label(), Some("beta"));
        assert_eq!(v("1.0").label(), None);
    }

    #[test]
    fn test_label_may_contain_hyphen() {
        let version = v("1.0.0-beta-2");
        assert_eq!(version.label(), Some("beta-2"));
    }
}
