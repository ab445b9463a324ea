//! Lookups against the on-disk package cache.
//!
//! A cache root holds one directory per package id, one subdirectory per
//! version, and the package contents below that:
//! `<root>/<id>/<version>/lib/<profile>/*.dll`. Restore tools write ids and
//! versions lower-cased, older layouts keep the declared spelling, so both are
//! probed.

use std::path::{Path, PathBuf};

use rebind_core::binary::ResolvedBinary;
use rebind_core::name::Name;
use rebind_core::profile::TargetProfile;
use rebind_core::version::PackageVersion;
use rebind_metadata::ModuleReader;
use rebind_util::errors::{RebindError, RebindResult};
use rebind_util::fs::{is_executable, owning_root, relative_slash_path};

/// Outcome of choosing a binary folder inside a package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibFolder {
    /// The package has no `lib` folder.
    Missing,
    /// Profile folders exist but none suits the target profile.
    Incompatible(Vec<String>),
    Selected(PathBuf),
}

/// Prioritized list of package cache roots.
#[derive(Debug, Clone, Default)]
pub struct PackageCacheProbe {
    roots: Vec<PathBuf>,
}

impl PackageCacheProbe {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::with_capacity(roots.len());
        for root in roots {
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        Self { roots: unique }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every directory that could hold `id` at `version`, in probe order.
    pub fn candidate_dirs(&self, id: &Name, version: &PackageVersion) -> Vec<PathBuf> {
        let ids = spellings(id.as_str());
        let versions = spellings(&version.to_normalized());
        let mut dirs = Vec::new();
        for root in &self.roots {
            for id in &ids {
                for version in &versions {
                    let dir = root.join(id).join(version);
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
            }
        }
        dirs
    }

    /// The first existing package directory for `id` at `version`.
    pub fn package_dir(&self, id: &Name, version: &PackageVersion) -> Option<PathBuf> {
        self.candidate_dirs(id, version)
            .into_iter()
            .find(|dir| dir.is_dir())
    }

    /// Locate a runtime asset declared by a package, relative to its
    /// package directory.
    pub fn find_asset(&self, id: &Name, version: &PackageVersion, asset: &str) -> Option<PathBuf> {
        self.candidate_dirs(id, version)
            .into_iter()
            .map(|dir| dir.join(asset))
            .find(|path| path.is_file())
    }

    /// Choose the `lib` subfolder nearest to `profile`.
    ///
    /// A `lib` folder without subfolders holds profile-neutral binaries.
    pub fn lib_folder(&self, package_dir: &Path, profile: &TargetProfile) -> RebindResult<LibFolder> {
        let base = package_dir.join("lib");
        if !base.is_dir() {
            return Ok(LibFolder::Missing);
        }

        let mut folders: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&base).map_err(RebindError::from)? {
            let entry = entry.map_err(RebindError::from)?;
            let path = entry.path();
            if path.is_dir() {
                folders.push((entry.file_name().to_string_lossy().into_owned(), path));
            }
        }
        if folders.is_empty() {
            return Ok(LibFolder::Selected(base));
        }
        folders.sort();

        let candidates = folders
            .iter()
            .filter_map(|(name, path)| TargetProfile::parse(name).map(|p| (p, path)));
        match profile.nearest(candidates) {
            Some((_, path)) => Ok(LibFolder::Selected(path.clone())),
            None => Ok(LibFolder::Incompatible(
                folders.into_iter().map(|(name, _)| name).collect(),
            )),
        }
    }

    /// Every `.dll`/`.exe` directly inside `folder`, sorted by cache-relative
    /// path.
    pub fn binaries_in(&self, reader: &dyn ModuleReader, folder: &Path) -> RebindResult<Vec<ResolvedBinary>> {
        let mut binaries = Vec::new();
        for entry in std::fs::read_dir(folder).map_err(RebindError::from)? {
            let path = entry.map_err(RebindError::from)?.path();
            if path.is_file() && is_executable(&path) {
                binaries.push(self.binary(reader, &path)?);
            }
        }
        binaries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(binaries)
    }

    /// Read the identity of the module at `path`.
    pub fn binary(&self, reader: &dyn ModuleReader, path: &Path) -> RebindResult<ResolvedBinary> {
        let identity = reader.read_identity(path)?;
        let relative_path = match owning_root(&self.roots, path) {
            Some(root) => relative_slash_path(root, path),
            None => path.to_string_lossy().into_owned(),
        };
        Ok(ResolvedBinary::new(relative_path, path.to_path_buf(), identity))
    }
}

fn spellings(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    if lower == text {
        vec![lower]
    } else {
        vec![text.to_string(), lower]
    }
}
