//! Target profiles: the runtime compatibility tag of a module build.
//!
//! Packages ship one `lib/<profile>/` folder per profile they target. A
//! consumer picks the *nearest* compatible folder: a profile of its own
//! family wins over the portable standard profile, and within the chosen
//! family the highest version that does not exceed the consumer's wins.
//! Platform folders (`net6.0-windows`) only serve consumers of that platform,
//! and beat the neutral folder of the same version when they do.

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

/// Runtime family of a target profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileFamily {
    /// The desktop framework (`net45`, `net472`).
    Framework,
    /// The cross-runtime API surface (`netstandard2.0`).
    Standard,
    /// The cross-platform runtime (`netcoreapp3.1`, `net6.0`).
    Core,
}

/// Operating system a core profile can be specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Windows,
    Android,
    Ios,
    MacOs,
    MacCatalyst,
    TvOs,
    Tizen,
    Browser,
}

impl Platform {
    /// Parse a platform suffix; a trailing platform version is ignored
    /// (`windows10.0.19041` -> `windows`).
    pub fn parse(text: &str) -> Option<Self> {
        let name = text.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        let platform = match name.to_ascii_lowercase().as_str() {
            "windows" => Platform::Windows,
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            "macos" => Platform::MacOs,
            "maccatalyst" => Platform::MacCatalyst,
            "tvos" => Platform::TvOs,
            "tizen" => Platform::Tizen,
            "browser" => Platform::Browser,
            _ => return None,
        };
        Some(platform)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::MacOs => "macos",
            Platform::MacCatalyst => "maccatalyst",
            Platform::TvOs => "tvos",
            Platform::Tizen => "tizen",
            Platform::Browser => "browser",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed target profile such as `net472`, `netstandard2.0` or
/// `net6.0-windows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetProfile {
    pub family: ProfileFamily,
    pub version: (u32, u32, u32),
    /// Only ever set on core profiles from 5.0 on.
    pub platform: Option<Platform>,
}

impl TargetProfile {
    pub const fn new(family: ProfileFamily, version: (u32, u32, u32)) -> Self {
        Self {
            family,
            version,
            platform: None,
        }
    }

    pub const fn with_platform(self, platform: Platform) -> Self {
        Self {
            platform: Some(platform),
            ..self
        }
    }

    /// Parse a folder name (`net45`, `netstandard2.0`, `net6.0-windows`) or a
    /// full framework name (`.NETFramework,Version=v4.7.2`).
    ///
    /// Returns `None` for unrecognized or portable profiles.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_ascii_lowercase();
        if let Some((name, version)) = lower.split_once(",version=v") {
            let family = match name {
                ".netframework" => ProfileFamily::Framework,
                ".netstandard" => ProfileFamily::Standard,
                ".netcoreapp" => ProfileFamily::Core,
                _ => return None,
            };
            return Some(Self::new(family, parse_dotted(version)?));
        }

        if let Some((base, suffix)) = lower.split_once('-') {
            let platform = Platform::parse(suffix)?;
            let profile = Self::parse(base)?;
            let platform_capable = profile.family == ProfileFamily::Core && profile.version.0 >= 5;
            return platform_capable.then_some(profile.with_platform(platform));
        }
        let base = lower.as_str();

        if let Some(v) = base.strip_prefix("netstandard") {
            return Some(Self::new(ProfileFamily::Standard, parse_dotted(v)?));
        }
        if let Some(v) = base.strip_prefix("netcoreapp") {
            return Some(Self::new(ProfileFamily::Core, parse_dotted(v)?));
        }
        if let Some(v) = base.strip_prefix("net") {
            if v.contains('.') {
                let version = parse_dotted(v)?;
                return (version.0 >= 5).then_some(Self::new(ProfileFamily::Core, version));
            }
            return Some(Self::new(ProfileFamily::Framework, parse_compact(v)?));
        }
        None
    }

    /// Whether a consumer targeting `self` can load a build for `other`.
    pub fn is_compatible_with(&self, other: &TargetProfile) -> bool {
        if other.platform.is_some() && other.platform != self.platform {
            return false;
        }
        match (self.family, other.family) {
            (a, b) if a == b => other.version <= self.version,
            (ProfileFamily::Framework, ProfileFamily::Standard)
            | (ProfileFamily::Core, ProfileFamily::Standard) => self
                .max_standard()
                .is_some_and(|max| other.version <= max),
            _ => false,
        }
    }

    /// Highest standard profile version implemented by this profile.
    fn max_standard(&self) -> Option<(u32, u32, u32)> {
        match self.family {
            ProfileFamily::Standard => Some(self.version),
            ProfileFamily::Framework => match self.version {
                v if v >= (4, 6, 1) => Some((2, 0, 0)),
                v if v >= (4, 6, 0) => Some((1, 3, 0)),
                v if v >= (4, 5, 1) => Some((1, 2, 0)),
                v if v >= (4, 5, 0) => Some((1, 1, 0)),
                _ => None,
            },
            ProfileFamily::Core => match self.version {
                v if v >= (3, 0, 0) => Some((2, 1, 0)),
                v if v >= (2, 0, 0) => Some((2, 0, 0)),
                _ => Some((1, 6, 0)),
            },
        }
    }

    /// Pick the candidate nearest to `self`, or `None` when none is compatible.
    ///
    /// Same-family candidates beat standard ones; then the higher version
    /// wins, then a platform-specific build beats a neutral one.
    /// Remaining ties keep the earliest candidate, so callers should pass
    /// candidates in a stable order.
    pub fn nearest<'a, T>(
        &self,
        candidates: impl IntoIterator<Item = (TargetProfile, &'a T)>,
    ) -> Option<(TargetProfile, &'a T)> {
        let mut best: Option<(TargetProfile, &'a T)> = None;
        for (profile, item) in candidates {
            if !self.is_compatible_with(&profile) {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, _)) => self.rank(&profile, &current) == Ordering::Greater,
            };
            if better {
                best = Some((profile, item));
            }
        }
        best
    }

    fn rank(&self, a: &TargetProfile, b: &TargetProfile) -> Ordering {
        let same_a = a.family == self.family;
        let same_b = b.family == self.family;
        same_a
            .cmp(&same_b)
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.platform.is_some().cmp(&b.platform.is_some()))
    }
}

fn parse_dotted(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = [0u32; 3];
    let mut count = 0;
    for token in text.split('.') {
        if count == 3 {
            // Allow a trailing fourth zero part: v4.0.0.0
            if token == "0" {
                continue;
            }
            return None;
        }
        parts[count] = token.parse().ok()?;
        count += 1;
    }
    (count > 0).then_some((parts[0], parts[1], parts[2]))
}

/// `4` -> 4.0, `45` -> 4.5, `472` -> 4.7.2; dotted forms are rejected.
fn parse_compact(text: &str) -> Option<(u32, u32, u32)> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digit = |i: usize| text[i..i + 1].parse::<u32>().ok();
    match text.len() {
        1 => Some((digit(0)?, 0, 0)),
        2 => Some((digit(0)?, digit(1)?, 0)),
        3 => Some((digit(0)?, digit(1)?, digit(2)?)),
        _ => None,
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, c) = self.version;
        match self.family {
            ProfileFamily::Framework => {
                write!(f, "net{a}{b}")?;
                if c != 0 {
                    write!(f, "{c}")?;
                }
            }
            ProfileFamily::Standard => write!(f, "netstandard{a}.{b}")?,
            ProfileFamily::Core if a >= 5 => write!(f, "net{a}.{b}")?,
            ProfileFamily::Core => write!(f, "netcoreapp{a}.{b}")?,
        }
        match self.platform {
            Some(platform) => write!(f, "-{platform}"),
            None => Ok(()),
        }
    }
}

impl Serialize for TargetProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
