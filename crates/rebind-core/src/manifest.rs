//! Per-project dependency manifests consumed by the library merger.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::library::{DependencyEdge, LibraryKind};
use crate::name::Name;
use crate::profile::TargetProfile;
use crate::version::{PackageVersion, VersionRange};

/// The restored dependency closure of one build project.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    /// Output module name of the project.
    pub project_name: Name,
    pub target_profile: TargetProfile,
    /// Package cache roots in priority order.
    pub package_roots: Vec<PathBuf>,
    pub libraries: Vec<ManifestLibrary>,
    /// Declarations resolved at restore time, e.g. `"Foo >= 1.0.0-*"`.
    pub floating_markers: Vec<String>,
}

/// One library of a project's closure as the restore step recorded it.
#[derive(Debug, Clone)]
pub struct ManifestLibrary {
    pub name: Name,
    pub version: PackageVersion,
    pub kind: LibraryKind,
    pub dependencies: Vec<DependencyEdge>,
    /// Runtime asset paths relative to the package directory.
    pub runtime_assets: Vec<String>,
}

impl ProjectManifest {
    /// The range each library of the closure is effectively constrained to:
    /// the intersection of every declared range naming it and its own exact
    /// version.
    pub fn resolved_ranges(&self) -> BTreeMap<Name, VersionRange> {
        let mut ranges: BTreeMap<Name, VersionRange> = BTreeMap::new();
        let declared = self
            .libraries
            .iter()
            .flat_map(|lib| lib.dependencies.iter().cloned())
            .chain(
                self.libraries
                    .iter()
                    .map(|lib| DependencyEdge::new(lib.name.clone(), VersionRange::at_least(lib.version.clone()))),
            );
        for edge in declared {
            match ranges.get_mut(&edge.target) {
                Some(range) => *range = range.intersect(&edge.range),
                None => {
                    ranges.insert(edge.target, edge.range);
                }
            }
        }
        ranges
    }

    /// The edges of the synthetic library representing this project: one per
    /// library of its closure.
    pub fn project_edges(&self) -> Vec<DependencyEdge> {
        let ranges = self.resolved_ranges();
        self.libraries
            .iter()
            .map(|lib| {
                let range = ranges
                    .get(&lib.name)
                    .cloned()
                    .unwrap_or_else(|| VersionRange::at_least(lib.version.clone()));
                DependencyEdge::new(lib.name.clone(), range)
            })
            .collect()
    }
}
