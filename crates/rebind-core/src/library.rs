//! Library entries of the merged dependency graph.
//!
//! A library is either a cached package or an in-workspace project. Both
//! carry declared dependency edges; only packages ship runtime binaries.
//! Construction happens in two phases: structural fields are set when the
//! library is merged, `resolved` is filled in once the complete authoritative
//! table exists.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::binary::ResolvedBinary;
use crate::name::Name;
use crate::version::{PackageVersion, VersionRange};

/// Whether a library comes from the package cache or the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Package,
    Project,
}

/// Version every in-workspace project is published at.
pub fn project_version() -> PackageVersion {
    PackageVersion::new(1, 0, 0)
}

/// Range used by edges that reference an in-workspace project.
pub fn project_range() -> VersionRange {
    VersionRange::at_least(project_version())
}

/// A dependency as declared by its owning library.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DependencyEdge {
    pub target: Name,
    #[serde(serialize_with = "serialize_display")]
    pub range: VersionRange,
}

impl DependencyEdge {
    pub fn new(target: impl Into<Name>, range: VersionRange) -> Self {
        Self {
            target: target.into(),
            range,
        }
    }

    /// The synthetic edge attributed to demand discovered in binaries.
    pub fn unresolved() -> Self {
        Self::new(ResolvedBinary::UNRESOLVED, VersionRange::unconstrained())
    }

    pub fn min_version(&self) -> Option<&PackageVersion> {
        self.range.min_version()
    }

    /// Whether the edge points at an in-workspace project.
    pub fn is_project_reference(&self) -> bool {
        self.range == project_range()
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.range)
    }
}

/// A declared edge together with the binaries it contributes at run time.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDependency {
    pub edge: DependencyEdge,
    pub binaries: Vec<ResolvedBinary>,
}

impl ResolvedDependency {
    pub fn new(edge: DependencyEdge, binaries: Vec<ResolvedBinary>) -> Self {
        Self { edge, binaries }
    }

    /// An edge whose target package is not materialized in any cache root.
    pub fn unresolved(edge: DependencyEdge) -> Self {
        Self {
            edge,
            binaries: vec![ResolvedBinary::unresolved()],
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.binaries.iter().any(ResolvedBinary::is_unresolved)
    }
}

impl fmt::Display for ResolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files: Vec<String> = self
            .binaries
            .iter()
            .filter(|b| !b.relative_path.ends_with(".resources.dll"))
            .map(ToString::to_string)
            .collect();
        write!(f, "{} ({})", self.edge, files.join(" , "))
    }
}

/// One resolved library: a package at a version, or a workspace project.
///
/// Identity is `(name, version, range)`; entries with the same name but
/// different versions are distinct and only ever supersede each other.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryModel {
    pub name: Name,
    pub version: PackageVersion,
    #[serde(serialize_with = "serialize_display")]
    pub range: VersionRange,
    pub kind: LibraryKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub declared: Vec<DependencyEdge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolved: Vec<ResolvedDependency>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runtime_binaries: Vec<ResolvedBinary>,
}

impl LibraryModel {
    pub fn package(
        name: impl Into<Name>,
        version: PackageVersion,
        range: VersionRange,
        declared: Vec<DependencyEdge>,
        runtime_binaries: Vec<ResolvedBinary>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            range,
            kind: LibraryKind::Package,
            declared,
            resolved: Vec::new(),
            runtime_binaries,
        }
    }

    pub fn project(name: impl Into<Name>, declared: Vec<DependencyEdge>) -> Self {
        Self {
            name: name.into(),
            version: project_version(),
            range: project_range(),
            kind: LibraryKind::Project,
            declared,
            resolved: Vec::new(),
            runtime_binaries: Vec::new(),
        }
    }

    pub fn is_package(&self) -> bool {
        self.kind == LibraryKind::Package
    }

    /// Whether this library loads anything at run time.
    ///
    /// Projects always produce their own output module.
    pub fn has_runtime_binaries(&self) -> bool {
        match self.kind {
            LibraryKind::Package => !self.runtime_binaries.is_empty(),
            LibraryKind::Project => true,
        }
    }
}

impl PartialEq for LibraryModel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.range == other.range
    }
}

impl Eq for LibraryModel {}

impl Ord for LibraryModel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.range.cmp(&other.range))
    }
}

impl PartialOrd for LibraryModel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for LibraryModel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.range.hash(state);
    }
}

impl fmt::Display for LibraryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LibraryKind::Package => write!(
                f,
                "{}/{} (r = {} , nd = {})",
                self.name,
                self.range,
                self.runtime_binaries.len(),
                self.resolved.len()
            ),
            LibraryKind::Project => write!(f, "{} (nd = {})", self.name, self.resolved.len()),
        }
    }
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn project_libraries_always_have_runtime_binaries() {
        let project = LibraryModel::project("App", vec![]);
        assert!(project.has_runtime_binaries());
        assert_eq!(project.version, v("1.0.0"));
        assert_eq!(project.range, project_range());

        let package = LibraryModel::package("Foo", v("1.0"), VersionRange::exact(v("1.0")), vec![], vec![]);
        assert!(!package.has_runtime_binaries());
    }

    #[test]
    fn identity_ignores_edges_and_name_case() {
        let a = LibraryModel::package("Foo", v("1.0"), VersionRange::exact(v("1.0")), vec![], vec![]);
        let mut b = LibraryModel::package("FOO", v("1.0"), VersionRange::exact(v("1.0")), vec![], vec![]);
        b.declared.push(DependencyEdge::new("Bar", VersionRange::at_least(v("2.0"))));
        assert_eq!(a, b);

        let c = LibraryModel::package("Foo", v("2.0"), VersionRange::exact(v("2.0")), vec![], vec![]);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn project_reference_edges() {
        assert!(DependencyEdge::new("Lib", project_range()).is_project_reference());
        assert!(!DependencyEdge::new("Lib", VersionRange::exact(v("1.0"))).is_project_reference());
    }

    #[test]
    fn unresolved_dependency() {
        let dep = ResolvedDependency::unresolved(DependencyEdge::new("Gone", VersionRange::at_least(v("1.0"))));
        assert!(dep.is_unresolved());
        assert_eq!(dep.to_string(), "Gone [1.0.0, ) (*** (0.0.0.0))");
    }

    #[test]
    fn display_by_kind() {
        let package = LibraryModel::package("Foo", v("1.0"), VersionRange::at_least(v("1.0")), vec![], vec![]);
        assert_eq!(package.to_string(), "Foo/[1.0.0, ) (r = 0 , nd = 0)");
        assert_eq!(LibraryModel::project("App", vec![]).to_string(), "App (nd = 0)");
    }
}
