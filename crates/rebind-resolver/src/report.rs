//! Curious cases met while indexing dependents.
//!
//! None of these stop a run, but each usually points at a packaging mistake
//! worth a look.

use std::fmt;

use rebind_core::library::LibraryModel;
use rebind_core::name::Name;
use rebind_core::version::ModuleVersion;

use crate::dependents::DependentsIndex;

/// Report of every curious case found in one run.
#[derive(Debug, Default)]
pub struct CuriousReport {
    pub cases: Vec<CuriousCase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CuriousCase {
    /// Several physical files declare the same module version.
    SharedVersion {
        module: Name,
        version: ModuleVersion,
        files: Vec<String>,
    },
    /// One file is reached through edges with different ranges.
    PackageVariants {
        file: String,
        version: ModuleVersion,
        ranges: Vec<String>,
    },
    /// A declared edge whose package is missing from every cache root.
    Unresolved { owner: Name, edge: String },
}

impl CuriousReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect curious cases from an index built before cross-checking, and
    /// unresolved edges from `libraries`.
    pub fn collect<'a>(index: &DependentsIndex<'_>, libraries: impl IntoIterator<Item = &'a LibraryModel>) -> Self {
        let mut report = Self::new();
        for (module, versions) in index.iter() {
            if module.as_str() == rebind_core::binary::ResolvedBinary::UNRESOLVED {
                continue;
            }
            for (version, binaries) in versions {
                if binaries.len() > 1 {
                    report.add(CuriousCase::SharedVersion {
                        module: module.clone(),
                        version: *version,
                        files: binaries.keys().map(|b| b.relative_path.clone()).collect(),
                    });
                }
                for (binary, edges) in binaries {
                    if edges.len() > 1 {
                        report.add(CuriousCase::PackageVariants {
                            file: binary.relative_path.clone(),
                            version: *version,
                            ranges: edges.keys().map(|e| e.range.to_string()).collect(),
                        });
                    }
                }
            }
        }
        for lib in libraries {
            for dep in lib.resolved.iter().filter(|d| d.is_unresolved()) {
                report.add(CuriousCase::Unresolved {
                    owner: lib.name.clone(),
                    edge: dep.edge.to_string(),
                });
            }
        }
        report
    }

    pub fn add(&mut self, case: CuriousCase) {
        self.cases.push(case);
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }
}

impl fmt::Display for CuriousReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cases.is_empty() {
            return write!(f, "No curious cases.");
        }
        writeln!(f, "Curious cases ({}):", self.cases.len())?;
        for case in &self.cases {
            writeln!(f, "  {case}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CuriousCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CuriousCase::SharedVersion {
                module,
                version,
                files,
            } => write!(
                f,
                "{module}, Version={version}: {} files ({})",
                files.len(),
                files.join(" , ")
            ),
            CuriousCase::PackageVariants {
                file,
                version,
                ranges,
            } => write!(
                f,
                "{file}, Version={version}: {} variants of the same package ({})",
                ranges.len(),
                ranges.join(" , ")
            ),
            CuriousCase::Unresolved { owner, edge } => {
                write!(f, "{owner}: unresolved dependency {edge}")
            }
        }
    }
}
