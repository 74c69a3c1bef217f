//! Target-framework monikers (`net45`, `sl4-wp`, `.NETFramework,Version=v4.0`).
//!
//! Compact monikers follow `{identifier}{version}[-{profile}]`. Identifiers and
//! profiles are matched against fixed alias tables; an unknown identifier makes
//! the whole moniker unsupported, while unknown profiles pass through as-is.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Canonical identifier used when a moniker has only a version (`40`).
pub const DEFAULT_FRAMEWORK_IDENTIFIER: &str = ".NETFramework";

/// Alias → canonical identifier. Lookup is case-insensitive.
const IDENTIFIER_ALIASES: &[(&str, &str)] = &[
    ("net", ".NETFramework"),
    (".net", ".NETFramework"),
    ("netframework", ".NETFramework"),
    (".netframework", ".NETFramework"),
    ("sl", "Silverlight"),
    ("silverlight", "Silverlight"),
    ("netmf", ".NETMicroFramework"),
    (".netmicroframework", ".NETMicroFramework"),
    ("winrt", ".NETCore"),
    ("netcore", ".NETCore"),
    (".netcore", ".NETCore"),
];

/// Canonical identifier → short folder name.
const IDENTIFIER_SHORT_NAMES: &[(&str, &str)] = &[
    (".NETFramework", "net"),
    ("Silverlight", "sl"),
    (".NETMicroFramework", "netmf"),
    (".NETCore", "netcore"),
];

/// Alias → canonical profile. An empty canonical value means "no profile".
const PROFILE_ALIASES: &[(&str, &str)] = &[
    ("client", "Client"),
    ("full", ""),
    ("wp", "WindowsPhone"),
    ("wp7", "WindowsPhone7"),
    ("cf", "CompactFramework"),
];

static COMPACT_MONIKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<identifier>[A-Za-z.]*)(?P<version>[0-9.]*)(?:-(?P<profile>.+))?$")
        .expect("moniker pattern is valid")
});

/// Returned when a moniker names an unknown framework or has a malformed
/// version.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{text}' is not a supported target framework")]
pub struct UnsupportedFramework {
    text: String,
}

impl UnsupportedFramework {
    /// The literal text that was rejected.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A framework version with two to four components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FrameworkVersion(Vec<u32>);

impl FrameworkVersion {
    /// Build a version from its components, zero-padding to two.
    pub fn new(components: &[u32]) -> Self {
        let mut parts = components.iter().copied().take(4).collect::<Vec<_>>();
        while parts.len() < 2 {
            parts.push(0);
        }
        Self(parts)
    }

    /// The components, always at least `major.minor`.
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    fn is_zero(&self) -> bool {
        self.0.iter().all(|c| *c == 0)
    }

    /// Digits-only token: each digit is one component (`451` → 4.5.1).
    fn from_digits(token: &str) -> Self {
        let digits: Vec<u32> = token
            .chars()
            .take(4)
            .filter_map(|c| c.to_digit(10))
            .collect();
        Self::new(&digits)
    }

    fn from_dotted(token: &str) -> Option<Self> {
        let parts = token
            .split('.')
            .map(|p| p.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        (1..=4).contains(&parts.len()).then(|| Self::new(&parts))
    }
}

impl Default for FrameworkVersion {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&text)
    }
}

/// A parsed target framework.
///
/// ```
/// use parcel_schema::FrameworkMoniker;
///
/// let fx = FrameworkMoniker::parse("net45-client").unwrap();
/// assert_eq!(fx.identifier(), ".NETFramework");
/// assert_eq!(fx.version().to_string(), "4.5");
/// assert_eq!(fx.profile(), Some("Client"));
/// assert_eq!(fx.short_name(), "net45-client");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameworkMoniker {
    identifier: String,
    version: FrameworkVersion,
    profile: Option<String>,
}

impl FrameworkMoniker {
    /// Create a moniker from canonical parts.
    pub fn new(identifier: &str, version: FrameworkVersion, profile: Option<&str>) -> Self {
        Self {
            identifier: identifier.to_string(),
            version,
            profile: profile.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Canonical identifier (`.NETFramework`, `Silverlight`, ...).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Framework version.
    pub fn version(&self) -> &FrameworkVersion {
        &self.version
    }

    /// Canonical profile, if any.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Parse a compact (`net40-client`) or full
    /// (`.NETFramework,Version=v4.0,Profile=Client`) moniker.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedFramework`] when the identifier is not in the alias
    /// table or a non-empty version token cannot be parsed.
    pub fn parse(text: &str) -> Result<Self, UnsupportedFramework> {
        let unsupported = || UnsupportedFramework {
            text: text.to_string(),
        };
        let value = text.trim();
        if value.is_empty() {
            return Err(unsupported());
        }
        if value.contains(',') {
            return Self::parse_full_name(value).ok_or_else(unsupported);
        }

        let captures = COMPACT_MONIKER.captures(value).ok_or_else(unsupported)?;
        let identifier_token = captures.name("identifier").map_or("", |m| m.as_str());
        let version_token = captures.name("version").map_or("", |m| m.as_str());
        let profile_token = captures.name("profile").map(|m| m.as_str());

        let identifier = if identifier_token.is_empty() {
            DEFAULT_FRAMEWORK_IDENTIFIER
        } else {
            canonical_identifier(identifier_token).ok_or_else(unsupported)?
        };

        let version = if version_token.is_empty() {
            FrameworkVersion::default()
        } else if version_token.contains('.') {
            FrameworkVersion::from_dotted(version_token).ok_or_else(unsupported)?
        } else {
            FrameworkVersion::from_digits(version_token)
        };

        let profile = profile_token.map(canonical_profile);
        Ok(Self::new(identifier, version, profile.as_deref()))
    }

    /// Parse, returning `None` for unsupported monikers.
    pub fn try_parse(text: &str) -> Option<Self> {
        Self::parse(text).ok()
    }

    fn parse_full_name(value: &str) -> Option<Self> {
        let mut parts = value.split(',').map(str::trim);
        let identifier = canonical_identifier(parts.next()?)?;
        let mut version = None;
        let mut profile = None;
        for part in parts {
            let (key, val) = part.split_once('=')?;
            match key.trim().to_ascii_lowercase().as_str() {
                "version" => {
                    let token = val.trim();
                    let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
                    version = Some(FrameworkVersion::from_dotted(token)?);
                }
                "profile" => profile = Some(canonical_profile(val.trim())),
                _ => return None,
            }
        }
        Some(Self::new(identifier, version?, profile.as_deref()))
    }

    /// Compact folder-style name (`net40`, `sl4-wp`, `netcore45`).
    pub fn short_name(&self) -> String {
        let identifier = IDENTIFIER_SHORT_NAMES
            .iter()
            .find(|(canonical, _)| *canonical == self.identifier)
            .map_or(self.identifier.as_str(), |(_, short)| *short);

        let mut name = identifier.to_string();
        if !self.version.is_zero() {
            let mut components = self.version.components().to_vec();
            while components.len() > 2 && components.last() == Some(&0) {
                components.pop();
            }
            if components.iter().all(|c| *c < 10) {
                name.extend(components.iter().map(u32::to_string));
            } else {
                name.push_str(&FrameworkVersion(components).to_string());
            }
        }
        if let Some(profile) = &self.profile {
            let short = PROFILE_ALIASES
                .iter()
                .find(|(_, canonical)| *canonical == profile.as_str())
                .map_or(profile.as_str(), |(alias, _)| *alias);
            name.push('-');
            name.push_str(&short.to_ascii_lowercase());
        }
        name
    }
}

fn canonical_identifier(token: &str) -> Option<&'static str> {
    IDENTIFIER_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
        .map(|(_, canonical)| *canonical)
}

fn canonical_profile(token: &str) -> String {
    PROFILE_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(token))
        .map_or_else(|| token.to_string(), |(_, canonical)| (*canonical).to_string())
}

impl fmt::Display for FrameworkMoniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},Version=v{}", self.identifier, self.version)?;
        if let Some(profile) = &self.profile {
            write!(f, ",Profile={profile}")?;
        }
        Ok(())
    }
}

impl FromStr for FrameworkMoniker {
    type Err = UnsupportedFramework;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
