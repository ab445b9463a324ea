//! Links every declared dependency edge to the binaries it brings in.

use rebind_core::library::{DependencyEdge, LibraryKind, LibraryModel, ResolvedDependency};
use rebind_core::name::Name;
use rebind_core::version::PackageVersion;
use rebind_util::errors::{RebindError, RebindResult};
use tracing::{debug, info};

use crate::cache::LibFolder;
use crate::context::ResolveContext;
use crate::merger::MergedLibraries;

/// Fill in `resolved` for every authoritative library.
///
/// Discarded libraries are only ever link targets, never linked themselves.
pub fn link(ctx: &ResolveContext<'_>, merged: &mut MergedLibraries) -> RebindResult<()> {
    let mut links: Vec<(Name, Vec<ResolvedDependency>)> = Vec::with_capacity(merged.libraries.len());
    {
        let linker = DependencyLinker { ctx, merged: &*merged };
        for lib in merged.libraries.values() {
            links.push((lib.name.clone(), linker.link_library(lib)?));
        }
    }
    for (name, resolved) in links {
        if let Some(lib) = merged.libraries.get_mut(&name) {
            lib.resolved = resolved;
        }
    }
    Ok(())
}

struct DependencyLinker<'a> {
    ctx: &'a ResolveContext<'a>,
    merged: &'a MergedLibraries,
}

impl DependencyLinker<'_> {
    fn link_library(&self, lib: &LibraryModel) -> RebindResult<Vec<ResolvedDependency>> {
        let mut resolved = Vec::new();
        for edge in &lib.declared {
            if lib.kind == LibraryKind::Project
                && edge.is_project_reference()
                && self.ctx.is_workspace_project(&edge.target)
            {
                continue;
            }
            if let Some(dep) = self.link_edge(lib, edge)? {
                resolved.push(dep);
            }
        }
        resolved.sort_by(|a, b| a.edge.target.cmp(&b.edge.target));
        Ok(resolved)
    }

    fn link_edge(&self, owner: &LibraryModel, edge: &DependencyEdge) -> RebindResult<Option<ResolvedDependency>> {
        let authoritative = self.merged.get(&edge.target).ok_or_else(|| {
            RebindError::resolution(format!(
                "Failed to map {edge} to one of the packages on which {} depends.",
                owner.name
            ))
        })?;
        if !authoritative.is_package() {
            debug!("link({}) : skip dependency {edge} - workspace project", owner.name);
            return Ok(None);
        }

        let discarded = edge
            .min_version()
            .and_then(|v| self.merged.get_discarded(&edge.target, v));
        let mut version: PackageVersion = match (discarded, edge.min_version()) {
            (Some(lib), _) => lib.version.clone(),
            (None, Some(v)) => v.clone(),
            (None, None) => authoritative.version.clone(),
        };
        // Binaries of other versions come from the folder the active profile selects
        let mut target = (version == authoritative.version).then_some(authoritative);

        let package_dir = match self.ctx.probe.package_dir(&edge.target, &version) {
            Some(dir) => dir,
            None => {
                let Some(marker) = self.merged.floating_marker(&edge.target) else {
                    debug!("link({}) : unresolved dependency {edge} - not found", owner.name);
                    return Ok(Some(ResolvedDependency::unresolved(edge.clone())));
                };
                version = authoritative.version.clone();
                target = Some(authoritative);
                self.ctx.probe.package_dir(&edge.target, &version).ok_or_else(|| {
                    let dirs: Vec<String> = self
                        .ctx
                        .probe
                        .candidate_dirs(&edge.target, &version)
                        .iter()
                        .map(|d| d.display().to_string())
                        .collect();
                    RebindError::resolution(format!(
                        "Failed to resolve {marker} - none of \"{}\" exists",
                        dirs.join("\" \"")
                    ))
                })?
            }
        };

        if let Some(lib) = target {
            if lib.runtime_binaries.is_empty() {
                debug!("link({}) : skip dependency {edge} - no runtime binaries", owner.name);
                return Ok(None);
            }
            debug!("link({}) : take dependency {edge} - {}", owner.name, lib.name);
            return Ok(Some(ResolvedDependency::new(edge.clone(), lib.runtime_binaries.clone())));
        }

        let folder = match self.ctx.probe.lib_folder(&package_dir, &self.merged.target_profile)? {
            LibFolder::Selected(folder) => folder,
            LibFolder::Missing => {
                debug!("link({}) : skip dependency {edge} - no runtime binaries", owner.name);
                return Ok(None);
            }
            LibFolder::Incompatible(profiles) => {
                info!(
                    "link({}) : skip dependency {edge} - none of its profiles is compatible with {} (\"{}\")",
                    owner.name,
                    self.merged.target_profile,
                    profiles.join("\" \"")
                );
                return Ok(None);
            }
        };

        let binaries = self.ctx.probe.binaries_in(self.ctx.reader, &folder)?;
        if binaries.is_empty() {
            debug!("link({}) : skip dependency {edge} - no runtime binaries", owner.name);
            return Ok(None);
        }
        debug!("link({}) : take dependency {edge} - {}", owner.name, folder.display());
        Ok(Some(ResolvedDependency::new(edge.clone(), binaries)))
    }
}
