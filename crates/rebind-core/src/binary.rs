//! Identity of compiled modules found on disk.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::name::Name;
use crate::version::ModuleVersion;

/// Name, version, culture and signing key of a compiled module, either as it
/// declares itself or as another module references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleIdentity {
    pub name: String,
    pub version: ModuleVersion,
    /// `None` for the invariant culture.
    pub culture: Option<String>,
    /// Lower-case hex public key token; `None` for unsigned modules.
    pub public_key_token: Option<String>,
}

impl ModuleIdentity {
    pub fn is_signed(&self) -> bool {
        self.public_key_token.is_some()
    }

    /// Culture as written in loader configuration.
    pub fn culture_or_neutral(&self) -> &str {
        self.culture.as_deref().unwrap_or("neutral")
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name,
            self.version,
            self.culture_or_neutral(),
            self.public_key_token.as_deref().unwrap_or("null")
        )
    }
}

/// One compiled module resolved to a file inside a package cache root.
///
/// Two binaries are the same when their cache-relative paths match
/// (ignoring case) and they carry the same module version.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBinary {
    pub relative_path: String,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    #[serde(skip)]
    pub identity: ModuleIdentity,
}

impl ResolvedBinary {
    /// Path, name and file name of the unresolved sentinel.
    pub const UNRESOLVED: &'static str = "***";

    pub fn new(relative_path: String, absolute_path: PathBuf, identity: ModuleIdentity) -> Self {
        Self {
            relative_path,
            absolute_path,
            identity,
        }
    }

    /// The sentinel standing for "declared but not found on disk".
    pub fn unresolved() -> Self {
        Self {
            relative_path: Self::UNRESOLVED.to_string(),
            absolute_path: PathBuf::from(Self::UNRESOLVED),
            identity: ModuleIdentity {
                name: Self::UNRESOLVED.to_string(),
                version: ModuleVersion::default(),
                culture: None,
                public_key_token: None,
            },
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.relative_path == Self::UNRESOLVED
    }

    pub fn module_name(&self) -> Name {
        Name::new(self.identity.name.as_str())
    }

    pub fn module_version(&self) -> ModuleVersion {
        self.identity.version
    }

    pub fn is_signed(&self) -> bool {
        self.identity.is_signed()
    }

    pub fn file_name(&self) -> &str {
        Path::new(&self.relative_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.relative_path)
    }

    fn folded_path(&self) -> impl Iterator<Item = u8> + '_ {
        self.relative_path.bytes().map(|b| b.to_ascii_uppercase())
    }
}

impl PartialEq for ResolvedBinary {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path.eq_ignore_ascii_case(&other.relative_path)
            && self.identity.version == other.identity.version
    }
}

impl Eq for ResolvedBinary {}

impl Ord for ResolvedBinary {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded_path()
            .cmp(other.folded_path())
            .then_with(|| self.identity.version.cmp(&other.identity.version))
    }
}

impl PartialOrd for ResolvedBinary {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for ResolvedBinary {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded_path() {
            state.write_u8(b);
        }
        self.identity.version.hash(state);
    }
}

impl fmt::Display for ResolvedBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.relative_path, self.identity.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(path: &str, version: ModuleVersion, token: Option<&str>) -> ResolvedBinary {
        ResolvedBinary::new(
            path.to_string(),
            PathBuf::from("/cache").join(path),
            ModuleIdentity {
                name: "Foo".to_string(),
                version,
                culture: None,
                public_key_token: token.map(str::to_string),
            },
        )
    }

    #[test]
    fn equality_uses_path_and_version() {
        let v = ModuleVersion::new(1, 0, 0, 0);
        let a = binary("foo/1.0.0/lib/net45/Foo.dll", v, Some("abc"));
        let b = binary("FOO/1.0.0/lib/net45/foo.dll", v, None);
        let c = binary("foo/1.0.0/lib/net45/Foo.dll", ModuleVersion::new(1, 0, 1, 0), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unresolved_sentinel() {
        let u = ResolvedBinary::unresolved();
        assert!(u.is_unresolved());
        assert!(!u.is_signed());
        assert_eq!(u.module_version(), ModuleVersion::default());
        assert!(!binary("x.dll", ModuleVersion::default(), None).is_unresolved());
    }

    #[test]
    fn file_name_and_display() {
        let b = binary("foo/1.0.0/lib/net45/Foo.dll", ModuleVersion::new(1, 2, 0, 0), Some("abc"));
        assert_eq!(b.file_name(), "Foo.dll");
        assert_eq!(b.to_string(), "foo/1.0.0/lib/net45/Foo.dll (1.2.0.0)");
        assert!(b.is_signed());
    }

    #[test]
    fn identity_display() {
        let id = ModuleIdentity {
            name: "WebGrease".to_string(),
            version: ModuleVersion::new(1, 5, 2, 14234),
            culture: None,
            public_key_token: Some("31bf3856ad364e35".to_string()),
        };
        assert_eq!(
            id.to_string(),
            "WebGrease, Version=1.5.2.14234, Culture=neutral, PublicKeyToken=31bf3856ad364e35"
        );
    }
}
