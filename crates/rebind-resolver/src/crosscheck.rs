//! Demand discovered by reading the binaries packages actually ship.
//!
//! Package metadata can disagree with the module references compiled into
//! the package's own binaries, e.g. a package declaring a dependency on
//! `WebGrease 1.5.2` while its module was built against `WebGrease
//! 1.5.1.25624`. Such references are added to the index through the
//! unresolved sentinel so arbitration has to account for them.

use std::collections::BTreeMap;

use rebind_core::binary::ResolvedBinary;
use rebind_core::library::{DependencyEdge, LibraryModel};
use rebind_core::name::Name;
use rebind_core::version::ModuleVersion;
use rebind_util::errors::RebindResult;
use tracing::debug;

use crate::context::ResolveContext;
use crate::dependents::DependentsIndex;

/// Add binary-level references missing from `index`, then drop the entry
/// collecting unresolved declared edges. Returns the number of module
/// versions added.
pub fn cross_check<'a>(ctx: &ResolveContext<'_>, index: &mut DependentsIndex<'a>) -> RebindResult<usize> {
    let mut discovered: BTreeMap<(Name, ModuleVersion), Vec<&'a LibraryModel>> = BTreeMap::new();

    for package in index.dependent_packages() {
        for binary in &package.runtime_binaries {
            for reference in ctx.reader.read_references(&binary.absolute_path)? {
                let name = Name::new(reference.name.as_str());
                let version = reference.version;
                if !reference.is_signed() {
                    debug!(
                        "references({}) : skip {name} ({version}) - unsigned",
                        binary.relative_path
                    );
                    continue;
                }
                if !index.contains_name(&name) {
                    let extra = if ctx.redist.contains(&name, version) {
                        "framework module"
                    } else {
                        "unknown"
                    };
                    debug!(
                        "references({}) : skip {name} ({version}) - not found ({extra})",
                        binary.relative_path
                    );
                    continue;
                }
                if index.contains_version(&name, version) {
                    debug!(
                        "references({}) : skip {name} ({version}) - version match",
                        binary.relative_path
                    );
                    continue;
                }

                debug!("references({}) : add {name} ({version})", binary.relative_path);
                let packages = discovered.entry((name, version)).or_default();
                if !packages.contains(&package) {
                    packages.push(package);
                }
            }
        }
    }

    let added = discovered.len();
    for ((name, version), packages) in discovered {
        for package in packages {
            index.insert_at(
                name.clone(),
                version,
                ResolvedBinary::unresolved(),
                DependencyEdge::unresolved(),
                package,
            );
        }
    }

    index.remove(&Name::new(ResolvedBinary::UNRESOLVED));
    Ok(added)
}
