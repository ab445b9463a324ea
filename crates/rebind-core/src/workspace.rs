//! Workspace description file (`rebind.toml`) and project build ordering.
//!
//! The workspace file lists the build projects, where their restore output
//! lives, and how they reference each other. [`ProjectGraph`] turns it into
//! the ordered sequence of projects whose manifests feed the merger.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use rebind_util::errors::RebindError;
use serde::Deserialize;

use crate::name::Name;

/// Default file name of the workspace description.
pub const WORKSPACE_FILE: &str = "rebind.toml";

/// Parsed `rebind.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceFile {
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectEntry>,
}

/// Workspace-wide settings from `[workspace]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceSettings {
    /// Package cache roots tried before the ones recorded by restore.
    #[serde(default)]
    pub package_roots: Vec<PathBuf>,
    #[serde(default)]
    pub redist_list: Option<PathBuf>,
    #[serde(default)]
    pub private_probing_path: Option<String>,
}

/// One `[[project]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectEntry {
    /// Output module name.
    pub name: Name,
    /// Path to the project's `project.assets.json`.
    pub assets: PathBuf,
    /// Build group (solution) the project belongs to.
    #[serde(default)]
    pub group: Option<String>,
    /// In-workspace project references.
    #[serde(default)]
    pub references: Vec<String>,
    /// Binary references; seeds the closure of projects to merge.
    #[serde(default)]
    pub dll_references: Vec<String>,
}

impl WorkspaceFile {
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            RebindError::Manifest {
                message: format!("Failed to parse workspace file: {e}"),
            }
            .into()
        })
    }

    /// Load a workspace file, resolving relative paths against its directory.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RebindError::Manifest {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        let mut file = Self::parse_toml(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        file.rebase(base);
        Ok(file)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };
        for root in &mut self.workspace.package_roots {
            *root = join(root);
        }
        if let Some(ref mut redist) = self.workspace.redist_list {
            *redist = join(redist);
        }
        for project in &mut self.projects {
            project.assets = join(&project.assets);
        }
    }

    pub fn project(&self, name: &str) -> Option<&ProjectEntry> {
        self.projects.iter().find(|p| p.name == name)
    }
}

/// Project reference graph with memoized reachability.
pub struct ProjectGraph<'a> {
    projects: &'a [ProjectEntry],
    graph: DiGraph<usize, ()>,
    by_name: HashMap<Name, NodeIndex>,
    reachable: HashMap<(NodeIndex, NodeIndex), bool>,
}

impl<'a> ProjectGraph<'a> {
    /// Build the graph, rejecting duplicate names, dangling references and
    /// reference cycles.
    pub fn new(projects: &'a [ProjectEntry]) -> miette::Result<Self> {
        let mut graph = DiGraph::new();
        let mut by_name = HashMap::new();
        for (i, project) in projects.iter().enumerate() {
            let idx = graph.add_node(i);
            if by_name.insert(project.name.clone(), idx).is_some() {
                return Err(RebindError::manifest(format!(
                    "Different projects with the same module name ( {} ) are not supported.",
                    project.name
                ))
                .into());
            }
        }

        for (i, project) in projects.iter().enumerate() {
            for reference in &project.references {
                let to = by_name.get(&Name::new(reference.as_str())).ok_or_else(|| {
                    RebindError::manifest(format!(
                        "The project {reference} referenced by {} could not be found in the workspace",
                        project.name
                    ))
                })?;
                graph.add_edge(NodeIndex::new(i), *to, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let project = &projects[graph[cycle.node_id()]];
            return Err(RebindError::manifest(format!(
                "Project reference cycle through {}",
                project.name
            ))
            .into());
        }

        Ok(Self {
            projects,
            graph,
            by_name,
            reachable: HashMap::new(),
        })
    }

    /// Whether `src` references `dst`, directly or transitively.
    pub fn references(&mut self, src: NodeIndex, dst: NodeIndex) -> bool {
        if src == dst {
            return false;
        }
        let graph = &self.graph;
        *self
            .reachable
            .entry((src, dst))
            .or_insert_with(|| has_path_connecting(graph, src, dst, None))
    }

    /// The projects whose manifests are merged for `focus`, in merge order.
    ///
    /// The focus project comes first. The closure of its binary references
    /// follows, grouped by build group; within a group a project is dropped
    /// when another project of the closure already references it, since the
    /// referencing project's manifest covers it.
    pub fn build_order(&mut self, focus: &str) -> miette::Result<Vec<&'a ProjectEntry>> {
        let focus_idx = *self.by_name.get(&Name::new(focus)).ok_or_else(|| {
            RebindError::manifest(format!("The project {focus} is not listed in the workspace"))
        })?;

        let mut closure: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([focus_idx]);
        while let Some(idx) = queue.pop_front() {
            let project = &self.projects[self.graph[idx]];
            for reference in &project.dll_references {
                if let Some(&dep) = self.by_name.get(&Name::new(reference.as_str())) {
                    if dep != focus_idx && closure.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }

        let mut members: Vec<NodeIndex> = closure.into_iter().collect();
        members.sort();

        let mut groups: Vec<(Option<&str>, Vec<NodeIndex>)> = Vec::new();
        for idx in members {
            let group = self.projects[self.graph[idx]].group.as_deref();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, list)) => list.push(idx),
                None => groups.push((group, vec![idx])),
            }
        }

        let mut order = vec![&self.projects[self.graph[focus_idx]]];
        for (_, list) in groups {
            let mut result: Vec<NodeIndex> = vec![list[0]];
            for &project in &list[1..] {
                let mut add = true;
                let mut j = result.len();
                while add && j > 0 {
                    j -= 1;
                    if self.references(project, result[j]) {
                        result.remove(j);
                    } else if self.references(result[j], project) {
                        add = false;
                    }
                }
                if add {
                    result.push(project);
                }
            }
            order.extend(result.into_iter().map(|idx| &self.projects[self.graph[idx]]));
        }

        tracing::debug!(
            "build order for {focus}: {}",
            order.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACE: &str = r#"
[workspace]
package-roots = ["packages"]
redist-list = "/ref/FrameworkList.xml"

[[project]]
name = "App"
assets = "App/obj/project.assets.json"
group = "main"
references = ["Services"]
dll-references = ["Services", "Data", "Tools"]

[[project]]
name = "Services"
assets = "Services/obj/project.assets.json"
group = "main"
references = ["Data"]
dll-references = ["Data"]

[[project]]
name = "Data"
assets = "Data/obj/project.assets.json"
group = "main"

[[project]]
name = "Tools"
assets = "Tools/obj/project.assets.json"
group = "tools"
"#;

    #[test]
    fn parse_workspace_file() {
        let ws = WorkspaceFile::parse_toml(WORKSPACE).unwrap();
        assert_eq!(ws.projects.len(), 4);
        assert_eq!(ws.workspace.package_roots, vec![PathBuf::from("packages")]);
        assert_eq!(ws.project("services").unwrap().references, vec!["Data"]);
    }

    #[test]
    fn from_path_rebases_relative_paths() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(WORKSPACE_FILE);
        std::fs::write(&path, WORKSPACE).unwrap();
        let ws = WorkspaceFile::from_path(&path).unwrap();
        assert_eq!(ws.workspace.package_roots, vec![tmp.path().join("packages")]);
        assert_eq!(ws.workspace.redist_list, Some(PathBuf::from("/ref/FrameworkList.xml")));
        assert_eq!(ws.projects[0].assets, tmp.path().join("App/obj/project.assets.json"));
    }

    #[test]
    fn build_order_prunes_referenced_projects() {
        let ws = WorkspaceFile::parse_toml(WORKSPACE).unwrap();
        let mut graph = ProjectGraph::new(&ws.projects).unwrap();
        let order: Vec<&str> = graph
            .build_order("App")
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        // Data is covered by Services in the same group
        assert_eq!(order, vec!["App", "Services", "Tools"]);
    }

    #[test]
    fn reachability_is_transitive() {
        let ws = WorkspaceFile::parse_toml(WORKSPACE).unwrap();
        let mut graph = ProjectGraph::new(&ws.projects).unwrap();
        let (app, data) = (NodeIndex::new(0), NodeIndex::new(2));
        assert!(graph.references(app, data));
        assert!(!graph.references(data, app));
        assert!(!graph.references(app, app));
    }

    #[test]
    fn unknown_focus_is_an_error() {
        let ws = WorkspaceFile::parse_toml(WORKSPACE).unwrap();
        let mut graph = ProjectGraph::new(&ws.projects).unwrap();
        assert!(graph.build_order("Missing").is_err());
    }

    #[test]
    fn cycles_are_rejected() {
        let ws = WorkspaceFile::parse_toml(
            r#"
[[project]]
name = "A"
assets = "a.json"
references = ["B"]

[[project]]
name = "B"
assets = "b.json"
references = ["A"]
"#,
        )
        .unwrap();
        let err = ProjectGraph::new(&ws.projects).err().unwrap();
        assert!(err.to_string().contains("cycle"), "got: {err}");
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let ws = WorkspaceFile::parse_toml(
            r#"
[[project]]
name = "A"
assets = "a.json"
references = ["Nope"]
"#,
        )
        .unwrap();
        assert!(ProjectGraph::new(&ws.projects).is_err());
    }
}
