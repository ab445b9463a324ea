//! Chooses the version every request for a module is redirected to.

use std::fmt;
use std::path::PathBuf;

use rebind_core::binary::ResolvedBinary;
use rebind_core::name::Name;
use rebind_core::redist::FrameworkRedistList;
use rebind_core::version::{ModuleVersion, PackageVersion};
use rebind_util::errors::{RebindError, RebindResult};
use tracing::{debug, info};

use crate::dependents::{BinariesAtVersion, Dependents, DependentsByVersion, DependentsIndex};

/// Redirect every version of a module up to `version` onto `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDirective {
    pub name: String,
    pub public_key_token: String,
    pub culture: String,
    pub version: ModuleVersion,
    /// File the redirect points at.
    pub source_path: PathBuf,
    /// `source_path` relative to its package cache root.
    pub relative_path: String,
}

impl RedirectDirective {
    pub fn from_binary(binary: &ResolvedBinary) -> Self {
        Self {
            name: binary.identity.name.clone(),
            public_key_token: binary.identity.public_key_token.clone().unwrap_or_default(),
            culture: binary.identity.culture_or_neutral().to_string(),
            version: binary.identity.version,
            source_path: binary.absolute_path.clone(),
            relative_path: binary.relative_path.clone(),
        }
    }

    /// `0.0.0.0-<version>`
    pub fn old_version_range(&self) -> String {
        format!("{}-{}", ModuleVersion::default(), self.version)
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for RedirectDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}, {})",
            self.name, self.version, self.public_key_token, self.culture
        )
    }
}

/// One directive per module demanded at more than one version.
pub fn arbitrate(index: &DependentsIndex<'_>, redist: &FrameworkRedistList) -> RebindResult<Vec<RedirectDirective>> {
    let mut directives = Vec::new();
    for (name, versions) in index.iter() {
        if versions.len() < 2 {
            continue;
        }
        if let Some(directive) = arbitrate_module(name, versions, redist)? {
            directives.push(directive);
        }
    }
    Ok(directives)
}

fn arbitrate_module(
    name: &Name,
    versions: &DependentsByVersion<'_>,
    redist: &FrameworkRedistList,
) -> RebindResult<Option<RedirectDirective>> {
    log_dependents(name, versions);

    let Some((&max_version, binaries)) = versions.last_key_value() else {
        return Ok(None);
    };
    let Some(found) = pick_binary(binaries) else {
        return Ok(None);
    };

    if found.is_unresolved() {
        if let Some(entry) = redist.get(name, max_version) {
            debug!("redirect : skip framework module {entry}");
            return Ok(None);
        }
        return Err(RebindError::resolution(format!(
            "Unable to resolve binding redirect for {name}, Version = {max_version}."
        ))
        .into());
    }

    if !found.is_signed() {
        info!(
            "redirect : skip {name}, Version = {max_version} - {} is not signed",
            found.relative_path
        );
        return Ok(None);
    }

    let directive = RedirectDirective::from_binary(found);
    debug!("redirect : {} - {directive}", found.absolute_path.display());
    Ok(Some(directive))
}

/// The binary at the winning version. Several physical files may claim it;
/// the one reached through the edge with the highest minimum package
/// version wins, earlier files keeping ties.
fn pick_binary<'b>(binaries: &'b BinariesAtVersion<'_>) -> Option<&'b ResolvedBinary> {
    let mut iter = binaries.iter();
    let (mut found, first) = iter.next()?;
    let mut max = max_package_version(first);
    for (binary, edges) in iter {
        let other = max_package_version(edges);
        if other > max {
            found = binary;
            max = other;
        }
    }
    Some(found)
}

fn max_package_version<'e>(edges: &'e Dependents<'_>) -> Option<&'e PackageVersion> {
    edges.keys().filter_map(|edge| edge.min_version()).max()
}

fn log_dependents(name: &Name, versions: &DependentsByVersion<'_>) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    for (version, binaries) in versions {
        for (binary, edges) in binaries {
            for (edge, libs) in edges {
                for lib in libs {
                    debug!(
                        "dependency of ({name}, Version = {version}, {}, {}) : {lib}",
                        binary.relative_path, edge.range
                    );
                }
            }
        }
    }
}
