//! Binding redirect resolution.
//!
//! A run merges the libraries of every project manifest, links each declared
//! dependency to the binaries it brings in, indexes which module versions are
//! demanded and by whom, adds demand found in the binaries themselves, and
//! settles every module demanded at more than one version on a single
//! redirect. Stages run strictly in that order; each needs the complete output
//! of the one before.

pub mod arbiter;
pub mod cache;
pub mod context;
pub mod crosscheck;
pub mod dependents;
pub mod emit;
pub mod linker;
pub mod merger;
pub mod report;

use rebind_core::manifest::ProjectManifest;
use rebind_util::errors::RebindResult;
use tracing::{debug, info};

pub use arbiter::RedirectDirective;
pub use cache::PackageCacheProbe;
pub use context::ResolveContext;
pub use merger::MergedLibraries;
pub use report::CuriousReport;

/// The outcome of a full resolution run.
#[derive(Debug)]
pub struct Resolution {
    pub libraries: MergedLibraries,
    /// Every redirect the arbiter settled on, in module name order.
    pub directives: Vec<RedirectDirective>,
    pub report: CuriousReport,
}

impl Resolution {
    /// Render the redirects a loader configuration should carry.
    pub fn render(&self, probing_path: Option<&str>) -> String {
        emit::render_all(&self.directives, probing_path)
    }
}

/// Run every stage against `manifests`, given in processing order.
pub fn resolve(ctx: &ResolveContext<'_>, manifests: &[ProjectManifest]) -> RebindResult<Resolution> {
    let mut libraries = merger::merge(ctx, manifests)?;
    linker::link(ctx, &mut libraries)?;

    let (directives, report) = {
        let mut index = dependents::DependentsIndex::build(libraries.libraries.values());
        let report = report::CuriousReport::collect(&index, libraries.libraries.values());
        if !report.is_empty() {
            debug!("{report}");
        }

        let added = crosscheck::cross_check(ctx, &mut index)?;
        debug!("cross-check added {added} module versions");

        (arbiter::arbitrate(&index, ctx.redist)?, report)
    };

    info!(
        "resolved {} libraries into {} redirects",
        libraries.libraries.len(),
        directives.len()
    );
    Ok(Resolution {
        libraries,
        directives,
        report,
    })
}
