//! Package version parsing, comparison, and range matching, plus the
//! four-part module version carried by compiled binaries.
//!
//! Package versions follow the restore tool's rules, which differ from semver:
//! - One to four numeric parts; missing parts are zero (`1.0` == `1.0.0.0`)
//! - An optional pre-release label after `-` sorts before the release
//! - Label segments split on `.`; numeric segments compare as numbers and sort
//!   before text segments; text compares case-insensitively
//! - Build metadata after `+` is ignored

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rebind_util::errors::RebindError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A parsed package version with comparable parts.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    parts: [u64; 4],
    label: Option<String>,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            parts: [major, minor, patch, 0],
            label: None,
        }
    }

    pub fn parse(version: &str) -> Result<Self, RebindError> {
        let invalid = || RebindError::manifest(format!("'{version}' is not a valid package version"));

        let trimmed = version.trim();
        let without_metadata = trimmed.split_once('+').map_or(trimmed, |(v, _)| v);
        let (numbers, label) = match without_metadata.split_once('-') {
            Some((n, l)) if !l.is_empty() => (n, Some(l.to_string())),
            Some(_) => return Err(invalid()),
            None => (without_metadata, None),
        };

        let mut parts = [0u64; 4];
        let mut count = 0;
        for token in numbers.split('.') {
            if count == 4 {
                return Err(invalid());
            }
            parts[count] = token.parse::<u64>().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self { parts, label })
    }

    /// The normalized spelling used for package cache directories:
    /// three parts, a fourth only when non-zero, then the label.
    pub fn to_normalized(&self) -> String {
        let [a, b, c, d] = self.parts;
        let mut s = if d == 0 {
            format!("{a}.{b}.{c}")
        } else {
            format!("{a}.{b}.{c}.{d}")
        };
        if let Some(ref label) = self.label {
            s.push('-');
            s.push_str(label);
        }
        s
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_normalized())
    }
}

impl FromStr for PackageVersion {
    type Err = RebindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
        self.label.is_some().hash(state);
        for segment in self.label.iter().flat_map(|l| l.split('.')) {
            match segment.parse::<u64>() {
                Ok(n) => (0u8, n).hash(state),
                Err(_) => (1u8, segment.to_ascii_lowercase()).hash(state),
            }
        }
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| compare_labels(self.label.as_deref(), other.label.as_deref()))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_normalized())
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn compare_labels(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // A release sorts after any of its pre-releases
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let ord = compare_label_segments(x, y);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}

fn compare_label_segments(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
    }
}

/// A version range expression as written in dependency declarations.
///
/// Supports: `1.0` (at least), `[1.0, )`, `[1.0]` (exact), `(1.0, 2.0]`,
/// `(, 2.0)` and the unconstrained range `(, )`. A trailing `*` on a bare
/// version is read as its lower bound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VersionRange {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bound {
    pub version: PackageVersion,
    pub inclusive: bool,
}

impl VersionRange {
    /// A range without bounds.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// `[version, )`
    pub fn at_least(version: PackageVersion) -> Self {
        Self {
            min: Some(Bound {
                version,
                inclusive: true,
            }),
            max: None,
        }
    }

    /// `[version]`
    pub fn exact(version: PackageVersion) -> Self {
        Self {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    pub fn parse(spec: &str) -> Result<Self, RebindError> {
        let s = spec.trim();
        if s.is_empty() {
            return Ok(Self::unconstrained());
        }
        if !s.starts_with('[') && !s.starts_with('(') {
            let floor = s.trim_end_matches('*').trim_end_matches(['.', '-']);
            if floor.is_empty() {
                return Ok(Self::unconstrained());
            }
            return Ok(Self::at_least(PackageVersion::parse(floor)?));
        }
        if s.len() < 2 || !(s.ends_with(']') || s.ends_with(')')) {
            return Err(RebindError::manifest(format!(
                "'{spec}' is not a valid version range"
            )));
        }

        let open_inclusive = s.starts_with('[');
        let close_inclusive = s.ends_with(']');
        let inner = &s[1..s.len() - 1];

        let bound = |text: &str, inclusive: bool| -> Result<Option<Bound>, RebindError> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(Bound {
                version: PackageVersion::parse(text)?,
                inclusive,
            }))
        };

        match inner.split_once(',') {
            Some((lower, upper)) => Ok(Self {
                min: bound(lower, open_inclusive)?,
                max: bound(upper, close_inclusive)?,
            }),
            None => {
                let v = PackageVersion::parse(inner.trim())?;
                Ok(Self::exact(v))
            }
        }
    }

    pub fn min_version(&self) -> Option<&PackageVersion> {
        self.min.as_ref().map(|b| &b.version)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Check if a version satisfies this range.
    pub fn contains(&self, version: &PackageVersion) -> bool {
        if let Some(ref lower) = self.min {
            match version.cmp(&lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(ref upper) = self.max {
            match version.cmp(&upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// The tightest range satisfied by every version both ranges accept.
    pub fn intersect(&self, other: &Self) -> Self {
        let min = match (&self.min, &other.min) {
            (None, b) => b.clone(),
            (a, None) => a.clone(),
            (Some(a), Some(b)) => Some(match a.version.cmp(&b.version) {
                Ordering::Greater => a.clone(),
                Ordering::Less => b.clone(),
                Ordering::Equal => Bound {
                    version: a.version.clone(),
                    inclusive: a.inclusive && b.inclusive,
                },
            }),
        };
        let max = match (&self.max, &other.max) {
            (None, b) => b.clone(),
            (a, None) => a.clone(),
            (Some(a), Some(b)) => Some(match a.version.cmp(&b.version) {
                Ordering::Less => a.clone(),
                Ordering::Greater => b.clone(),
                Ordering::Equal => Bound {
                    version: a.version.clone(),
                    inclusive: a.inclusive && b.inclusive,
                },
            }),
        };
        Self { min, max }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(a), Some(b)) if a.inclusive && b.inclusive && a.version == b.version => {
                write!(f, "[{}]", a.version)
            }
            (min, max) => {
                let open = if min.as_ref().is_some_and(|b| b.inclusive) { '[' } else { '(' };
                let close = if max.as_ref().is_some_and(|b| b.inclusive) { ']' } else { ')' };
                let lower = min.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                let upper = max.as_ref().map(|b| b.version.to_string()).unwrap_or_default();
                write!(f, "{open}{lower}, {upper}{close}")
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = RebindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The four-part version stamped into a compiled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl ModuleVersion {
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse `major.minor[.build[.revision]]`.
    pub fn parse(version: &str) -> Result<Self, RebindError> {
        let invalid = || RebindError::manifest(format!("'{version}' is not a valid module version"));
        let mut parts = [0u16; 4];
        let mut count = 0;
        for token in version.trim().split('.') {
            if count == 4 {
                return Err(invalid());
            }
            parts[count] = token.parse::<u16>().map_err(|_| invalid())?;
            count += 1;
        }
        if count < 2 {
            return Err(invalid());
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for ModuleVersion {
    type Err = RebindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModuleVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
