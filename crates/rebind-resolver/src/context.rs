//! Per-run resolution context.

use std::collections::BTreeSet;
use std::path::PathBuf;

use rebind_core::manifest::ProjectManifest;
use rebind_core::name::Name;
use rebind_core::redist::FrameworkRedistList;
use rebind_metadata::ModuleReader;

use crate::cache::PackageCacheProbe;

/// Everything a resolution run reads besides the manifests themselves.
///
/// Borrowed by every stage; nothing in it changes during a run.
pub struct ResolveContext<'a> {
    pub probe: PackageCacheProbe,
    pub reader: &'a dyn ModuleReader,
    pub redist: &'a FrameworkRedistList,
    /// Names of the projects known to the workspace; edges to them are
    /// structural and never linked to cache binaries.
    pub workspace_projects: BTreeSet<Name>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(probe: PackageCacheProbe, reader: &'a dyn ModuleReader, redist: &'a FrameworkRedistList) -> Self {
        Self {
            probe,
            reader,
            redist,
            workspace_projects: BTreeSet::new(),
        }
    }

    /// Build a context whose cache roots are `configured` followed by the
    /// roots recorded in the first manifest, and whose workspace projects are
    /// the projects of `manifests`.
    pub fn for_manifests(
        configured: &[PathBuf],
        manifests: &[ProjectManifest],
        reader: &'a dyn ModuleReader,
        redist: &'a FrameworkRedistList,
    ) -> Self {
        let mut roots = configured.to_vec();
        if let Some(first) = manifests.first() {
            roots.extend(first.package_roots.iter().cloned());
        }
        let mut ctx = Self::new(PackageCacheProbe::new(roots), reader, redist);
        ctx.workspace_projects = manifests.iter().map(|m| m.project_name.clone()).collect();
        ctx
    }

    pub fn with_workspace_projects(mut self, names: impl IntoIterator<Item = Name>) -> Self {
        self.workspace_projects.extend(names);
        self
    }

    pub fn is_workspace_project(&self, name: &Name) -> bool {
        self.workspace_projects.contains(name)
    }
}
