//! Loading the manifests, cache roots and framework list a run works from.

use std::path::{Path, PathBuf};

use rebind_core::assets::load_project_assets;
use rebind_core::manifest::ProjectManifest;
use rebind_core::name::Name;
use rebind_core::redist::FrameworkRedistList;
use rebind_core::workspace::{ProjectGraph, WorkspaceFile};
use rebind_metadata::ModuleReader;
use rebind_resolver::ResolveContext;
use rebind_util::errors::RebindError;
use tracing::{debug, info};

/// Where the manifests of a run come from, plus settings that override the
/// workspace file.
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    /// Workspace description file.
    pub workspace: Option<PathBuf>,
    /// Focus project; required with a workspace file.
    pub project: Option<String>,
    /// `project.assets.json` files merged in the given order, without a
    /// workspace file.
    pub assets: Vec<PathBuf>,
    pub package_roots: Vec<PathBuf>,
    pub redist_list: Option<PathBuf>,
    pub private_probing_path: Option<String>,
}

/// Everything loaded for one run.
#[derive(Debug)]
pub struct RunInputs {
    pub focus: Name,
    pub manifests: Vec<ProjectManifest>,
    pub package_roots: Vec<PathBuf>,
    pub redist: FrameworkRedistList,
    pub private_probing_path: Option<String>,
    /// Every project the workspace knows about, merged or not.
    pub workspace_projects: Vec<Name>,
}

impl RunInputs {
    pub fn context<'a>(&'a self, reader: &'a dyn ModuleReader) -> ResolveContext<'a> {
        ResolveContext::for_manifests(&self.package_roots, &self.manifests, reader, &self.redist)
            .with_workspace_projects(self.workspace_projects.iter().cloned())
    }
}

/// Load the inputs described by `opts`.
pub fn load_inputs(opts: &InputOptions) -> miette::Result<RunInputs> {
    let mut inputs = match &opts.workspace {
        Some(path) => load_workspace(path, opts)?,
        None => load_assets_files(&opts.assets)?,
    };

    if !opts.package_roots.is_empty() {
        inputs.package_roots = opts.package_roots.clone();
    }
    if let Some(path) = &opts.redist_list {
        inputs.redist = FrameworkRedistList::from_path(path)?;
    }
    if let Some(probing) = &opts.private_probing_path {
        inputs.private_probing_path = Some(probing.replace('\\', "/"));
    }
    Ok(inputs)
}

fn load_workspace(path: &Path, opts: &InputOptions) -> miette::Result<RunInputs> {
    let focus = opts.project.as_deref().ok_or_else(|| RebindError::Generic {
        message: format!("A focus project is required with the workspace file {}", path.display()),
    })?;
    let file = WorkspaceFile::from_path(path)?;
    let mut graph = ProjectGraph::new(&file.projects)?;
    let order = graph.build_order(focus)?;

    let mut manifests = Vec::with_capacity(order.len());
    for entry in order {
        if !entry.assets.is_file() {
            debug!("{} : no project assets at {}", entry.name, entry.assets.display());
            continue;
        }
        info!("loading {}", entry.assets.display());
        manifests.push(load_project_assets(&entry.assets, entry.name.as_str())?);
    }
    if manifests.is_empty() {
        return Err(RebindError::manifest(format!(
            "No project.assets.json is associated with {focus} and {}.",
            path.display()
        ))
        .into());
    }

    let redist = match &file.workspace.redist_list {
        Some(list) => FrameworkRedistList::from_path(list)?,
        None => FrameworkRedistList::empty(),
    };
    Ok(RunInputs {
        focus: Name::new(focus),
        package_roots: file.workspace.package_roots.clone(),
        redist,
        private_probing_path: file.workspace.private_probing_path.clone(),
        workspace_projects: file.projects.iter().map(|p| p.name.clone()).collect(),
        manifests,
    })
}

fn load_assets_files(paths: &[PathBuf]) -> miette::Result<RunInputs> {
    if paths.is_empty() {
        return Err(RebindError::Generic {
            message: "Nothing to resolve: give a workspace file or at least one project.assets.json".to_string(),
        }
        .into());
    }
    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        info!("loading {}", path.display());
        manifests.push(load_project_assets(path, &project_name_for(path))?);
    }
    let focus = manifests[0].project_name.clone();
    Ok(RunInputs {
        focus,
        workspace_projects: manifests.iter().map(|m| m.project_name.clone()).collect(),
        manifests,
        package_roots: Vec::new(),
        redist: FrameworkRedistList::empty(),
        private_probing_path: None,
    })
}

/// Project name implied by an assets path: `App/obj/project.assets.json`
/// names `App`.
pub fn project_name_for(path: &Path) -> String {
    let dir = path.parent();
    let project_dir = match dir.and_then(|d| d.file_name()) {
        Some(name) if name == "obj" => dir.and_then(Path::parent),
        _ => dir,
    };
    project_dir
        .and_then(|d| d.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_from_assets_path() {
        assert_eq!(project_name_for(Path::new("src/App/obj/project.assets.json")), "App");
        assert_eq!(project_name_for(Path::new("Lib/project.assets.json")), "Lib");
    }

    #[test]
    fn nothing_to_resolve() {
        let err = load_inputs(&InputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Nothing to resolve"));
    }

    #[test]
    fn workspace_requires_focus() {
        let opts = InputOptions {
            workspace: Some(PathBuf::from("rebind.toml")),
            ..Default::default()
        };
        let err = load_inputs(&opts).unwrap_err();
        assert!(err.to_string().contains("focus project is required"));
    }
}
