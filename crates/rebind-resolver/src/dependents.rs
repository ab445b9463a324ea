//! Who depends on which module, at which version, through which file.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

use rebind_core::binary::ResolvedBinary;
use rebind_core::library::{DependencyEdge, LibraryModel};
use rebind_core::name::Name;
use rebind_core::version::ModuleVersion;
use tracing::debug;

/// Libraries attributed to one edge.
pub type Dependents<'a> = BTreeMap<DependencyEdge, Vec<&'a LibraryModel>>;

/// Physical files of one module version.
pub type BinariesAtVersion<'a> = BTreeMap<ResolvedBinary, Dependents<'a>>;

/// Every version of one module with dependents.
pub type DependentsByVersion<'a> = BTreeMap<ModuleVersion, BinariesAtVersion<'a>>;

/// Module name -> module version -> binary -> dependency edge -> dependents.
///
/// Only libraries that load something at run time contribute demand.
#[derive(Debug, Default)]
pub struct DependentsIndex<'a> {
    modules: BTreeMap<Name, DependentsByVersion<'a>>,
}

impl<'a> DependentsIndex<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the resolved dependencies of `libraries`.
    pub fn build(libraries: impl IntoIterator<Item = &'a LibraryModel>) -> Self {
        let mut index = Self::new();
        for lib in libraries {
            for dep in &lib.resolved {
                for binary in &dep.binaries {
                    if !lib.has_runtime_binaries() {
                        debug!(
                            "dependents({}, Version = {}) : skip {lib} - no runtime binaries",
                            binary.identity.name, binary.identity.version
                        );
                        continue;
                    }
                    index.insert(binary.clone(), dep.edge.clone(), lib);
                }
            }
        }
        index
    }

    pub fn insert(&mut self, binary: ResolvedBinary, edge: DependencyEdge, dependent: &'a LibraryModel) {
        self.insert_at(binary.module_name(), binary.module_version(), binary, edge, dependent);
    }

    /// Insert under an explicit module name and version, which for the
    /// unresolved sentinel differ from the binary's own identity.
    pub fn insert_at(
        &mut self,
        name: Name,
        version: ModuleVersion,
        binary: ResolvedBinary,
        edge: DependencyEdge,
        dependent: &'a LibraryModel,
    ) {
        let dependents = self
            .modules
            .entry(name)
            .or_default()
            .entry(version)
            .or_default()
            .entry(binary)
            .or_default()
            .entry(edge)
            .or_default();
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
    }

    pub fn versions(&self, name: &Name) -> Option<&DependentsByVersion<'a>> {
        self.modules.get(name)
    }

    pub fn contains_name(&self, name: &Name) -> bool {
        self.modules.contains_key(name)
    }

    pub fn contains_version(&self, name: &Name, version: ModuleVersion) -> bool {
        self.modules
            .get(name)
            .is_some_and(|versions| versions.contains_key(&version))
    }

    pub fn remove(&mut self, name: &Name) -> Option<DependentsByVersion<'a>> {
        self.modules.remove(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Name, DependentsByVersion<'a>> {
        self.modules.iter()
    }

    /// Package libraries recorded as dependents anywhere in the index.
    pub fn dependent_packages(&self) -> BTreeSet<&'a LibraryModel> {
        self.modules
            .values()
            .flat_map(|versions| versions.values())
            .flat_map(|binaries| binaries.values())
            .flat_map(|edges| edges.values())
            .flatten()
            .copied()
            .filter(|lib| lib.is_package())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebind_core::binary::ModuleIdentity;
    use rebind_core::library::ResolvedDependency;
    use rebind_core::version::{PackageVersion, VersionRange};
    use std::path::PathBuf;

    fn binary(path: &str, name: &str, version: ModuleVersion) -> ResolvedBinary {
        ResolvedBinary::new(
            path.to_string(),
            PathBuf::from("/cache").join(path),
            ModuleIdentity {
                name: name.to_string(),
                version,
                culture: None,
                public_key_token: Some("30ad4fe6b2a6aeed".to_string()),
            },
        )
    }

    fn package(name: &str, version: &str, binaries: Vec<ResolvedBinary>) -> LibraryModel {
        LibraryModel::package(
            name,
            PackageVersion::parse(version).unwrap(),
            VersionRange::unconstrained(),
            Vec::new(),
            binaries,
        )
    }

    #[test]
    fn indexes_by_module_then_version() {
        let v12 = ModuleVersion::new(12, 0, 0, 0);
        let v9 = ModuleVersion::new(9, 0, 0, 0);
        let json12 = binary("newtonsoft.json/12.0.1/lib/net45/Newtonsoft.Json.dll", "Newtonsoft.Json", v12);
        let json9 = binary("newtonsoft.json/9.0.1/lib/net45/Newtonsoft.Json.dll", "Newtonsoft.Json", v9);

        let mut a = package("A", "1.0.0", vec![binary("a/1.0.0/lib/net45/A.dll", "A", v9)]);
        a.resolved = vec![ResolvedDependency::new(
            DependencyEdge::new("Newtonsoft.Json", VersionRange::parse("12.0.1").unwrap()),
            vec![json12],
        )];
        let mut b = package("B", "1.0.0", vec![binary("b/1.0.0/lib/net45/B.dll", "B", v9)]);
        b.resolved = vec![ResolvedDependency::new(
            DependencyEdge::new("Newtonsoft.Json", VersionRange::parse("9.0.1").unwrap()),
            vec![json9],
        )];
        let mut empty = package("Meta", "1.0.0", Vec::new());
        empty.resolved = a.resolved.clone();

        let libs = [a, b, empty];
        let index = DependentsIndex::build(libs.iter());
        assert_eq!(index.len(), 1);
        let versions = index.versions(&Name::new("newtonsoft.json")).unwrap();
        assert_eq!(versions.keys().copied().collect::<Vec<_>>(), vec![v9, v12]);
        assert!(index.contains_version(&Name::new("Newtonsoft.Json"), v12));
        assert!(!index.contains_version(&Name::new("Newtonsoft.Json"), ModuleVersion::new(10, 0, 0, 0)));

        let names: Vec<&str> = index.dependent_packages().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
