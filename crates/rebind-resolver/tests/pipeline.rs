use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rebind_core::binary::ModuleIdentity;
use rebind_core::library::{DependencyEdge, LibraryKind};
use rebind_core::manifest::{ManifestLibrary, ProjectManifest};
use rebind_core::name::Name;
use rebind_core::profile::TargetProfile;
use rebind_core::redist::FrameworkRedistList;
use rebind_core::version::{ModuleVersion, PackageVersion, VersionRange};
use rebind_metadata::ModuleReader;
use rebind_resolver::{resolve, Resolution, ResolveContext};
use rebind_util::errors::{RebindError, RebindResult};
use tempfile::TempDir;

const TOKEN: &str = "30ad4fe6b2a6aeed";

/// Module identities keyed by file path; the files themselves are empty.
#[derive(Default)]
struct FakeReader {
    identities: HashMap<PathBuf, ModuleIdentity>,
    references: HashMap<PathBuf, Vec<ModuleIdentity>>,
}

impl ModuleReader for FakeReader {
    fn read_identity(&self, path: &Path) -> RebindResult<ModuleIdentity> {
        self.identities.get(path).cloned().ok_or_else(|| {
            RebindError::Metadata {
                path: path.display().to_string(),
                message: "not a module".to_string(),
            }
            .into()
        })
    }

    fn read_references(&self, path: &Path) -> RebindResult<Vec<ModuleIdentity>> {
        Ok(self.references.get(path).cloned().unwrap_or_default())
    }
}

struct Cache {
    dir: TempDir,
    reader: FakeReader,
}

fn identity(name: &str, version: [u16; 4], token: Option<&str>) -> ModuleIdentity {
    let [a, b, c, d] = version;
    ModuleIdentity {
        name: name.to_string(),
        version: ModuleVersion::new(a, b, c, d),
        culture: None,
        public_key_token: token.map(str::to_string),
    }
}

impl Cache {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            reader: FakeReader::default(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    fn module(&mut self, rel: &str, name: &str, version: [u16; 4], token: Option<&str>) -> &mut Self {
        let path = self.dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        self.reader.identities.insert(path, identity(name, version, token));
        self
    }

    fn references(&mut self, rel: &str, refs: Vec<ModuleIdentity>) -> &mut Self {
        self.reader.references.insert(self.dir.path().join(rel), refs);
        self
    }

    fn dir(&mut self, rel: &str) -> &mut Self {
        std::fs::create_dir_all(self.dir.path().join(rel)).unwrap();
        self
    }

    fn run(&self, manifests: &[ProjectManifest], redist: &FrameworkRedistList) -> RebindResult<Resolution> {
        let ctx = ResolveContext::for_manifests(&[], manifests, &self.reader, redist);
        resolve(&ctx, manifests)
    }
}

fn lib(name: &str, version: &str, deps: &[(&str, &str)], assets: &[&str]) -> ManifestLibrary {
    ManifestLibrary {
        name: Name::new(name),
        version: PackageVersion::parse(version).unwrap(),
        kind: LibraryKind::Package,
        dependencies: deps
            .iter()
            .map(|(target, range)| DependencyEdge::new(*target, VersionRange::parse(range).unwrap()))
            .collect(),
        runtime_assets: assets.iter().map(|a| a.to_string()).collect(),
    }
}

fn manifest(project: &str, cache: &Cache, libraries: Vec<ManifestLibrary>, markers: &[&str]) -> ProjectManifest {
    ProjectManifest {
        project_name: Name::new(project),
        target_profile: TargetProfile::parse("net472").unwrap(),
        package_roots: vec![cache.root()],
        libraries,
        floating_markers: markers.iter().map(|m| m.to_string()).collect(),
    }
}

fn no_redist() -> FrameworkRedistList {
    FrameworkRedistList::empty()
}

#[test]
fn discarded_version_still_links_and_newest_wins() {
    let mut cache = Cache::new();
    cache
        .module("newtonsoft.json/12.0.1/lib/net45/Newtonsoft.Json.dll", "Newtonsoft.Json", [12, 0, 0, 0], Some(TOKEN))
        .module("newtonsoft.json/9.0.1/lib/net45/Newtonsoft.Json.dll", "Newtonsoft.Json", [9, 0, 0, 0], Some(TOKEN))
        .module("oldpkg/1.0.0/lib/net45/OldPkg.dll", "OldPkg", [1, 0, 0, 0], Some(TOKEN));

    let app = manifest(
        "App",
        &cache,
        vec![lib("Newtonsoft.Json", "12.0.1", &[], &["lib/net45/Newtonsoft.Json.dll"])],
        &[],
    );
    let old = manifest(
        "Old",
        &cache,
        vec![
            lib("Newtonsoft.Json", "9.0.1", &[], &["lib/net45/Newtonsoft.Json.dll"]),
            lib("OldPkg", "1.0.0", &[("Newtonsoft.Json", "9.0.1")], &["lib/net45/OldPkg.dll"]),
        ],
        &[],
    );

    let resolution = cache.run(&[app, old], &no_redist()).unwrap();

    let json = Name::new("Newtonsoft.Json");
    assert_eq!(resolution.libraries.libraries[&json].version, PackageVersion::parse("12.0.1").unwrap());
    assert!(resolution
        .libraries
        .get_discarded(&json, &PackageVersion::parse("9.0.1").unwrap())
        .is_some());

    let old_pkg = &resolution.libraries.libraries[&Name::new("OldPkg")];
    assert_eq!(old_pkg.resolved.len(), 1);
    assert!(!old_pkg.resolved[0].is_unresolved());
    assert_eq!(
        old_pkg.resolved[0].binaries[0].relative_path,
        "newtonsoft.json/9.0.1/lib/net45/Newtonsoft.Json.dll"
    );

    assert_eq!(resolution.directives.len(), 1);
    let directive = &resolution.directives[0];
    assert_eq!(directive.name, "Newtonsoft.Json");
    assert_eq!(directive.version, ModuleVersion::new(12, 0, 0, 0));
    assert_eq!(directive.public_key_token, TOKEN);
    assert_eq!(directive.relative_path, "newtonsoft.json/12.0.1/lib/net45/Newtonsoft.Json.dll");

    let text = resolution.render(None);
    assert!(text.contains(r#"<bindingRedirect oldVersion="0.0.0.0-12.0.0.0" newVersion="12.0.0.0" />"#));
}

#[test]
fn discarded_version_uses_folder_of_active_profile() {
    let mut cache = Cache::new();
    cache
        .module("j/12.0.1/lib/net45/J.dll", "J", [12, 0, 0, 0], Some(TOKEN))
        .module("j/9.0.1/lib/net45/J.dll", "J", [9, 0, 0, 0], Some(TOKEN))
        .module("j/9.0.1/lib/netstandard2.0/J.dll", "J", [9, 0, 0, 0], Some(TOKEN))
        .module("o/1.0.0/lib/netstandard2.0/O.dll", "O", [1, 0, 0, 0], Some(TOKEN));

    let app = manifest("App", &cache, vec![lib("J", "12.0.1", &[], &["lib/net45/J.dll"])], &[]);
    let mut old = manifest(
        "Old",
        &cache,
        vec![
            lib("J", "9.0.1", &[], &["lib/netstandard2.0/J.dll"]),
            lib("O", "1.0.0", &[("J", "9.0.1")], &["lib/netstandard2.0/O.dll"]),
        ],
        &[],
    );
    old.target_profile = TargetProfile::parse("netstandard2.0").unwrap();

    let resolution = cache.run(&[app, old], &no_redist()).unwrap();

    let o = &resolution.libraries.libraries[&Name::new("O")];
    assert_eq!(o.resolved.len(), 1);
    let paths: Vec<&str> = o.resolved[0].binaries.iter().map(|b| b.relative_path.as_str()).collect();
    assert_eq!(paths, ["j/9.0.1/lib/net45/J.dll"]);
    assert_eq!(resolution.directives[0].relative_path, "j/12.0.1/lib/net45/J.dll");
}

fn cross_check_fixture() -> (Cache, Vec<ProjectManifest>) {
    let mut cache = Cache::new();
    cache
        .module("p/1.0.0/lib/net45/P.dll", "P", [1, 0, 0, 0], Some(TOKEN))
        .module("a/1.0.0/lib/net45/A.dll", "A", [1, 0, 0, 0], Some(TOKEN))
        .references(
            "p/1.0.0/lib/net45/P.dll",
            vec![
                identity("A", [2, 0, 0, 0], Some(TOKEN)),
                identity("mscorlib", [4, 0, 0, 0], Some("b77a5c561934e089")),
            ],
        );
    let app = manifest(
        "App",
        &cache,
        vec![
            lib("P", "1.0.0", &[("A", "1.0.0")], &["lib/net45/P.dll"]),
            lib("A", "1.0.0", &[], &["lib/net45/A.dll"]),
        ],
        &[],
    );
    (cache, vec![app])
}

#[test]
fn binary_reference_without_package_is_fatal() {
    let (cache, manifests) = cross_check_fixture();
    let err = cache.run(&manifests, &no_redist()).unwrap_err();
    assert!(err.to_string().contains("A, Version = 2.0.0.0"), "{err}");
}

#[test]
fn binary_reference_to_framework_module_is_forgiven() {
    let (cache, manifests) = cross_check_fixture();
    let redist = FrameworkRedistList::parse_xml(&format!(
        r#"<FileList><File AssemblyName="A" Version="2.0.0.0" PublicKeyToken="{TOKEN}" Culture="neutral" /></FileList>"#
    ))
    .unwrap();
    let resolution = cache.run(&manifests, &redist).unwrap();
    assert!(resolution.directives.is_empty());
}

#[test]
fn unsigned_binary_reference_adds_no_demand() {
    let (mut cache, manifests) = cross_check_fixture();
    cache.references(
        "p/1.0.0/lib/net45/P.dll",
        vec![identity("A", [2, 0, 0, 0], None)],
    );
    let resolution = cache.run(&manifests, &no_redist()).unwrap();
    assert!(resolution.directives.is_empty());
}

fn shared_version_fixture() -> (Cache, Vec<ProjectManifest>) {
    let mut cache = Cache::new();
    cache
        .module("b/3.1.0/lib/net45/B.dll", "B", [3, 1, 0, 0], Some(TOKEN))
        .module("zeta.b/3.2.0/lib/net45/B.dll", "B", [3, 1, 0, 0], Some(TOKEN))
        .module("b/2.0.0/lib/net40/B.dll", "B", [2, 0, 0, 0], Some(TOKEN))
        .module("b/2.0.0/lib/netstandard2.1/B.dll", "B", [2, 0, 0, 0], Some(TOKEN))
        .module("c/1.0.0/lib/net45/C.dll", "C", [1, 0, 0, 0], Some(TOKEN));
    let app = manifest(
        "App",
        &cache,
        vec![
            lib("B", "3.1.0", &[], &["lib/net45/B.dll"]),
            lib("Zeta.B", "3.2.0", &[], &["lib/net45/B.dll"]),
            lib("C", "1.0.0", &[("B", "2.0.0")], &["lib/net45/C.dll"]),
        ],
        &[],
    );
    (cache, vec![app])
}

#[test]
fn same_module_version_prefers_newest_package() {
    let (cache, manifests) = shared_version_fixture();
    let resolution = cache.run(&manifests, &no_redist()).unwrap();

    let c = &resolution.libraries.libraries[&Name::new("C")];
    assert_eq!(c.resolved[0].binaries[0].relative_path, "b/2.0.0/lib/net40/B.dll");

    assert_eq!(resolution.directives.len(), 1);
    assert_eq!(resolution.directives[0].version, ModuleVersion::new(3, 1, 0, 0));
    assert_eq!(resolution.directives[0].relative_path, "zeta.b/3.2.0/lib/net45/B.dll");
    assert!(!resolution.report.is_empty());

    let again = cache.run(&manifests, &no_redist()).unwrap();
    assert_eq!(again.directives, resolution.directives);
}

#[test]
fn rendering_is_idempotent() {
    let (cache, manifests) = shared_version_fixture();
    let first = cache.run(&manifests, &no_redist()).unwrap().render(Some("bin/private"));
    let second = cache.run(&manifests, &no_redist()).unwrap().render(Some("bin/private"));
    assert_eq!(first, second);
    assert!(first.contains(r#"href="bin/private/B.dll""#));
}

#[test]
fn unsigned_modules_never_redirect() {
    let mut cache = Cache::new();
    cache
        .module("u/2.0.0/lib/net45/U.dll", "U", [2, 0, 0, 0], None)
        .module("u/1.0.0/lib/net45/U.dll", "U", [1, 0, 0, 0], None)
        .module("d/1.0.0/lib/net45/D.dll", "D", [1, 0, 0, 0], Some(TOKEN));
    let app = manifest(
        "App",
        &cache,
        vec![
            lib("U", "2.0.0", &[], &["lib/net45/U.dll"]),
            lib("D", "1.0.0", &[("U", "1.0.0")], &["lib/net45/D.dll"]),
        ],
        &[],
    );
    let resolution = cache.run(&[app], &no_redist()).unwrap();
    assert!(resolution.directives.iter().all(|d| !d.public_key_token.is_empty()));
    assert!(resolution.directives.is_empty());
}

#[test]
fn missing_package_is_recorded_as_unresolved() {
    let mut cache = Cache::new();
    cache
        .module("f/1.0.0-beta2/lib/net45/F.dll", "F", [1, 0, 0, 0], Some(TOKEN))
        .module("g/1.0.0/lib/net45/G.dll", "G", [1, 0, 0, 0], Some(TOKEN));
    let libs = || {
        vec![
            lib("F", "1.0.0-beta2", &[], &["lib/net45/F.dll"]),
            lib("G", "1.0.0", &[("F", "1.0.0-beta1")], &["lib/net45/G.dll"]),
        ]
    };

    let plain = manifest("App", &cache, libs(), &[]);
    let resolution = cache.run(&[plain], &no_redist()).unwrap();
    let g = &resolution.libraries.libraries[&Name::new("G")];
    assert!(g.resolved[0].is_unresolved());
    assert!(resolution.report.to_string().contains("G: unresolved dependency F"));

    let floating = manifest("App", &cache, libs(), &["F >= 1.0.0-*"]);
    let resolution = cache.run(&[floating], &no_redist()).unwrap();
    let g = &resolution.libraries.libraries[&Name::new("G")];
    assert_eq!(g.resolved[0].binaries[0].relative_path, "f/1.0.0-beta2/lib/net45/F.dll");
}

#[test]
fn floating_marker_without_directory_is_fatal() {
    let mut cache = Cache::new();
    cache.module("g/1.0.0/lib/net45/G.dll", "G", [1, 0, 0, 0], Some(TOKEN));
    let app = manifest(
        "App",
        &cache,
        vec![
            lib("F", "1.0.0-beta2", &[], &[]),
            lib("G", "1.0.0", &[("F", "1.0.0-beta1")], &["lib/net45/G.dll"]),
        ],
        &["F >= 1.0.0-*"],
    );
    let err = cache.run(&[app], &no_redist()).unwrap_err();
    assert!(err.to_string().contains("Failed to resolve F >= 1.0.0-*"), "{err}");
}

#[test]
fn unknown_dependency_target_is_fatal() {
    let mut cache = Cache::new();
    cache.module("g/1.0.0/lib/net45/G.dll", "G", [1, 0, 0, 0], Some(TOKEN));
    let app = manifest(
        "App",
        &cache,
        vec![lib("G", "1.0.0", &[("Nowhere", "1.0.0")], &["lib/net45/G.dll"])],
        &[],
    );
    let err = cache.run(&[app], &no_redist()).unwrap_err();
    assert!(err.to_string().contains("Failed to map Nowhere"), "{err}");
}

#[test]
fn missing_runtime_asset_is_fatal() {
    let cache = Cache::new();
    let app = manifest("App", &cache, vec![lib("G", "1.0.0", &[], &["lib/net45/G.dll"])], &[]);
    let err = cache.run(&[app], &no_redist()).unwrap_err();
    assert!(err.to_string().contains("lib/net45/G.dll not found"), "{err}");
}

#[test]
fn incompatible_profiles_are_skipped() {
    let mut cache = Cache::new();
    cache
        .module("h/2.0.0/lib/net45/H.dll", "H", [2, 0, 0, 0], Some(TOKEN))
        .module("h/1.0.0/lib/netstandard2.1/H.dll", "H", [1, 0, 0, 0], Some(TOKEN))
        .module("k/1.0.0/lib/net45/K.dll", "K", [1, 0, 0, 0], Some(TOKEN))
        .dir("empty/1.0.0/content");
    let app = manifest(
        "App",
        &cache,
        vec![
            lib("H", "2.0.0", &[], &["lib/net45/H.dll"]),
            lib("Empty", "1.0.0", &[], &[]),
            lib("K", "1.0.0", &[("H", "1.0.0"), ("Empty", "1.0.0")], &["lib/net45/K.dll"]),
        ],
        &[],
    );
    let resolution = cache.run(&[app], &no_redist()).unwrap();
    let k = &resolution.libraries.libraries[&Name::new("K")];
    assert!(k.resolved.is_empty());
    assert!(resolution.directives.is_empty());
}

#[test]
fn workspace_project_edges_are_structural() {
    let mut cache = Cache::new();
    cache.module("n/1.0.0/lib/net45/N.dll", "N", [1, 0, 0, 0], Some(TOKEN));
    let mut shared = lib("Shared", "1.0.0", &[], &[]);
    shared.kind = LibraryKind::Project;
    let app = manifest(
        "App",
        &cache,
        vec![lib("N", "1.0.0", &[], &["lib/net45/N.dll"]), shared],
        &[],
    );
    let lib_manifest = manifest("Shared", &cache, vec![lib("N", "1.0.0", &[], &["lib/net45/N.dll"])], &[]);

    let resolution = cache.run(&[app, lib_manifest], &no_redist()).unwrap();
    let app = &resolution.libraries.libraries[&Name::new("App")];
    let targets: Vec<&str> = app.resolved.iter().map(|d| d.edge.target.as_str()).collect();
    assert_eq!(targets, vec!["N"]);
}
