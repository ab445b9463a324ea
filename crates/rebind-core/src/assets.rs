//! Reader for the restore step's `project.assets.json`.
//!
//! Only the parts the resolver needs are modelled: the first target's library
//! closure, the package folders in priority order, the restored project name,
//! and the floating declarations of the first dependency group.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rebind_util::errors::RebindError;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::library::{DependencyEdge, LibraryKind};
use crate::manifest::{ManifestLibrary, ProjectManifest};
use crate::name::Name;
use crate::profile::TargetProfile;
use crate::version::{PackageVersion, VersionRange};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetsFile {
    #[serde(default)]
    targets: Map<String, Value>,
    #[serde(default)]
    project_file_dependency_groups: Map<String, Value>,
    #[serde(default)]
    package_folders: Map<String, Value>,
    #[serde(default)]
    project: Option<AssetsProject>,
}

#[derive(Debug, Deserialize)]
struct AssetsProject {
    #[serde(default)]
    restore: Option<AssetsRestore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetsRestore {
    #[serde(default)]
    project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetLibrary {
    #[serde(rename = "type", default = "default_type")]
    kind: String,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    runtime: Map<String, Value>,
}

fn default_type() -> String {
    "package".to_string()
}

/// Load a `project.assets.json` file.
///
/// `fallback_name` names the project when the file does not record one.
pub fn load_project_assets(path: &Path, fallback_name: &str) -> miette::Result<ProjectManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| RebindError::Manifest {
        message: format!("Failed to read {}: {e}", path.display()),
    })?;
    parse_project_assets(&content, fallback_name).map_err(|e| {
        RebindError::Manifest {
            message: format!("Failed to process {}: {e}", path.display()),
        }
        .into()
    })
}

/// Parse the contents of a `project.assets.json` file.
pub fn parse_project_assets(json: &str, fallback_name: &str) -> Result<ProjectManifest, RebindError> {
    let file: AssetsFile = serde_json::from_str(json)
        .map_err(|e| RebindError::manifest(format!("invalid project assets: {e}")))?;

    let (target_key, target) = file
        .targets
        .iter()
        .next()
        .ok_or_else(|| RebindError::manifest("no restore targets"))?;
    let framework = target_key.split('/').next().unwrap_or(target_key);
    let target_profile = TargetProfile::parse(framework).ok_or_else(|| RebindError::Profile {
        message: format!("unsupported target framework '{framework}'"),
    })?;

    let target = target
        .as_object()
        .ok_or_else(|| RebindError::manifest(format!("target '{target_key}' is not an object")))?;
    let mut libraries = Vec::with_capacity(target.len());
    for (key, value) in target {
        libraries.push(parse_library(key, value)?);
    }

    let package_roots = file
        .package_folders
        .keys()
        .map(PathBuf::from)
        .collect::<Vec<_>>();

    let floating_markers = file
        .project_file_dependency_groups
        .values()
        .next()
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| s.contains('*'))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let project_name = file
        .project
        .and_then(|p| p.restore)
        .and_then(|r| r.project_name)
        .unwrap_or_else(|| fallback_name.to_string());

    Ok(ProjectManifest {
        project_name: Name::new(project_name),
        target_profile,
        package_roots,
        libraries,
        floating_markers,
    })
}

fn parse_library(key: &str, value: &Value) -> Result<ManifestLibrary, RebindError> {
    let (name, version) = key
        .split_once('/')
        .ok_or_else(|| RebindError::manifest(format!("library key '{key}' lacks a version")))?;
    let lib: TargetLibrary = serde_json::from_value(value.clone())
        .map_err(|e| RebindError::manifest(format!("library '{key}': {e}")))?;

    let kind = match lib.kind.as_str() {
        "project" => LibraryKind::Project,
        _ => LibraryKind::Package,
    };
    let dependencies = lib
        .dependencies
        .iter()
        .map(|(id, range)| VersionRange::parse(range).map(|r| DependencyEdge::new(id.as_str(), r)))
        .collect::<Result<Vec<_>, RebindError>>()?;

    Ok(ManifestLibrary {
        name: Name::new(name),
        version: PackageVersion::parse(version)?,
        kind,
        dependencies,
        runtime_assets: lib.runtime.keys().cloned().collect(),
    })
}
