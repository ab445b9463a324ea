//! Merges the libraries of several project manifests into one table.
//!
//! Projects are processed in the order given. The highest version of each
//! library becomes authoritative; versions that lose are kept in a discarded
//! table so dependents pinned to them can still be linked.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rebind_core::library::{LibraryKind, LibraryModel};
use rebind_core::manifest::{ManifestLibrary, ProjectManifest};
use rebind_core::name::Name;
use rebind_core::profile::TargetProfile;
use rebind_core::version::{PackageVersion, VersionRange};
use rebind_util::errors::{RebindError, RebindResult};
use rebind_util::fs::is_executable;
use tracing::debug;

use crate::context::ResolveContext;

/// Output of [`merge`].
#[derive(Debug, Clone)]
pub struct MergedLibraries {
    /// Profile of the first project; binaries are selected for it.
    pub target_profile: TargetProfile,
    pub libraries: BTreeMap<Name, LibraryModel>,
    pub discarded: BTreeMap<(Name, PackageVersion), LibraryModel>,
    pub floating_markers: BTreeSet<String>,
}

impl MergedLibraries {
    pub fn get(&self, name: &Name) -> Option<&LibraryModel> {
        self.libraries.get(name)
    }

    pub fn get_discarded(&self, name: &Name, version: &PackageVersion) -> Option<&LibraryModel> {
        self.discarded.get(&(name.clone(), version.clone()))
    }

    /// The first floating marker naming `name`.
    pub fn floating_marker(&self, name: &Name) -> Option<&str> {
        self.floating_markers
            .iter()
            .find(|marker| name.is_prefix_of(marker, ' '))
            .map(String::as_str)
    }

    /// Libraries with binaries at run time, packages and projects alike.
    pub fn runtime_libraries(&self) -> impl Iterator<Item = &LibraryModel> {
        self.libraries.values().filter(|lib| lib.has_runtime_binaries())
    }
}

/// Merge `manifests` into the authoritative and discarded tables.
///
/// Package runtime binaries are materialized here, so every library leaving
/// this stage knows what it ships.
pub fn merge(ctx: &ResolveContext<'_>, manifests: &[ProjectManifest]) -> RebindResult<MergedLibraries> {
    let first = manifests
        .first()
        .ok_or_else(|| RebindError::manifest("No project manifests to merge"))?;

    let mut merged = MergedLibraries {
        target_profile: first.target_profile,
        libraries: BTreeMap::new(),
        discarded: BTreeMap::new(),
        floating_markers: BTreeSet::new(),
    };

    for manifest in manifests {
        let project = &manifest.project_name;
        if merged.libraries.contains_key(project) {
            debug!("merge({project}) : already present, skipped");
            continue;
        }

        let ranges = manifest.resolved_ranges();
        for lib in &manifest.libraries {
            let range = ranges
                .get(&lib.name)
                .cloned()
                .unwrap_or_else(|| VersionRange::at_least(lib.version.clone()));
            let prev_version = merged.libraries.get(&lib.name).map(|prev| prev.version.clone());
            match prev_version {
                None => {
                    debug!("merge({project}) : {}/{}", lib.name, lib.version);
                    let model = materialize(ctx, lib, range)?;
                    merged.libraries.insert(lib.name.clone(), model);
                }
                Some(prev) if prev < lib.version => {
                    debug!("merge({project}) : {}/{} (prev {prev})", lib.name, lib.version);
                    let model = materialize(ctx, lib, range)?;
                    if let Some(old) = merged.libraries.insert(lib.name.clone(), model) {
                        merged.discarded.insert((old.name.clone(), old.version.clone()), old);
                    }
                }
                Some(prev) if prev > lib.version => {
                    debug!("merge({project}) : {}/{prev} (discard {})", lib.name, lib.version);
                    let model = materialize(ctx, lib, range)?;
                    merged.discarded.insert((model.name.clone(), model.version.clone()), model);
                }
                Some(_) => {
                    debug!("merge({project}) : {}/{} (same)", lib.name, lib.version);
                }
            }
        }

        debug!("merge({project}) : {project}/{}", rebind_core::library::project_version());
        merged
            .libraries
            .insert(project.clone(), LibraryModel::project(project.clone(), manifest.project_edges()));
        merged.floating_markers.extend(manifest.floating_markers.iter().cloned());
    }

    debug!(
        "merge : {} libraries, {} discarded, {} floating markers",
        merged.libraries.len(),
        merged.discarded.len(),
        merged.floating_markers.len()
    );
    Ok(merged)
}

fn materialize(ctx: &ResolveContext<'_>, lib: &ManifestLibrary, range: VersionRange) -> RebindResult<LibraryModel> {
    if lib.kind == LibraryKind::Project {
        return Ok(LibraryModel::project(lib.name.clone(), lib.dependencies.clone()));
    }

    let mut binaries = Vec::new();
    for asset in lib.runtime_assets.iter().filter(|a| is_executable(Path::new(a.as_str()))) {
        let path = ctx.probe.find_asset(&lib.name, &lib.version, asset).ok_or_else(|| {
            let dirs: Vec<String> = ctx
                .probe
                .candidate_dirs(&lib.name, &lib.version)
                .iter()
                .map(|d| d.display().to_string())
                .collect();
            RebindError::resolution(format!(
                "{asset} not found under any of \"{}\"",
                dirs.join("\" \"")
            ))
        })?;
        binaries.push(ctx.probe.binary(ctx.reader, &path)?);
    }
    binaries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(LibraryModel::package(
        lib.name.clone(),
        lib.version.clone(),
        range,
        lib.dependencies.clone(),
        binaries,
    ))
}
