//! Operation: report which packages a project ships at run time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use rebind_core::name::Name;
use rebind_metadata::ModuleReader;
use rebind_resolver::merger::merge;
use rebind_util::errors::RebindError;
use rebind_util::fs::write_file;
use serde::Serialize;
use tracing::{debug, warn};

use crate::inputs::{load_inputs, InputOptions};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageUsage {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PackageMetadata>,
    pub runtime_assemblies: Vec<String>,
}

/// Package id to its usage, ordered by id.
pub type UsageReport = BTreeMap<Name, PackageUsage>;

#[derive(Debug, Clone, Default)]
pub struct UsageOptions {
    pub inputs: InputOptions,
    /// A file, or a directory receiving `NuGetUsageReport-<project>.json`.
    pub output: PathBuf,
}

/// Build the usage report of the merged libraries and write it as JSON.
///
/// Returns the path written.
pub fn usage(opts: &UsageOptions, reader: &dyn ModuleReader) -> miette::Result<PathBuf> {
    let inputs = load_inputs(&opts.inputs)?;
    let ctx = inputs.context(reader);
    let merged = merge(&ctx, &inputs.manifests)?;

    let mut report = UsageReport::new();
    for lib in merged.runtime_libraries().filter(|lib| lib.is_package()) {
        let metadata = match ctx.probe.package_dir(&lib.name, &lib.version) {
            Some(dir) => read_package_metadata(&dir, &lib.name)?,
            None => None,
        };
        report.insert(
            lib.name.clone(),
            PackageUsage {
                version: lib.version.to_string(),
                metadata,
                runtime_assemblies: lib.runtime_binaries.iter().map(|b| b.file_name().to_string()).collect(),
            },
        );
    }

    let json = serde_json::to_string_pretty(&report).map_err(|e| RebindError::Generic {
        message: format!("Failed to serialize usage report: {e}"),
    })?;
    let path = report_path(&opts.output, inputs.focus.as_str());
    write_file(&path, &json).map_err(RebindError::from)?;
    Ok(path)
}

/// Resolve the report file for `project` when `target` names a directory.
pub fn report_path(target: &Path, project: &str) -> PathBuf {
    let as_text = target.to_string_lossy();
    if target.is_dir() || as_text.ends_with('/') || as_text.ends_with('\\') {
        target.join(format!("NuGetUsageReport-{project}.json"))
    } else {
        target.to_path_buf()
    }
}

fn read_package_metadata(package_dir: &Path, id: &Name) -> miette::Result<Option<PackageMetadata>> {
    let candidates = [
        package_dir.join(format!("{id}.nuspec")),
        package_dir.join(format!("{}.nuspec", id.as_str().to_lowercase())),
    ];
    let Some(path) = candidates.iter().find(|p| p.is_file()) else {
        debug!("{id} : no package metadata under {}", package_dir.display());
        return Ok(None);
    };
    let xml = std::fs::read_to_string(path).map_err(RebindError::from)?;
    match parse_nuspec(&xml) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            warn!("{id} : ignoring unreadable {} ({e})", path.display());
            Ok(None)
        }
    }
}

/// Read authors and project URL from a package metadata document.
pub fn parse_nuspec(xml: &str) -> Result<PackageMetadata, RebindError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = PackageMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
                text_buf.clear();
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                match path.join(">").as_str() {
                    "package>metadata>authors" => meta.authors = Some(text_buf.clone()),
                    "package>metadata>projectUrl" => meta.project_url = Some(text_buf.clone()),
                    _ => {}
                }
                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RebindError::manifest(format!("invalid package metadata: {e}")));
            }
            _ => {}
        }
    }

    Ok(meta)
}
