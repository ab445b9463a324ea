//! Operation: compute the binding redirects of a project and write them out.

use std::fmt;
use std::path::{Path, PathBuf};

use rebind_metadata::ModuleReader;
use rebind_resolver::{resolve, CuriousReport, RedirectDirective};
use rebind_util::errors::RebindError;
use rebind_util::fs::write_file;
use tracing::info;

use crate::inputs::{load_inputs, InputOptions};

/// Destination of a text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File(PathBuf),
}

impl Output {
    /// `-` names standard output, anything else a file.
    pub fn parse(text: &str) -> Self {
        if text == "-" {
            Output::Stdout
        } else {
            Output::File(PathBuf::from(text))
        }
    }

    fn write(&self, contents: &str) -> miette::Result<()> {
        match self {
            Output::Stdout => {
                if !contents.is_empty() {
                    println!("{contents}");
                }
                Ok(())
            }
            Output::File(path) => write_file(path, contents).map_err(|e| RebindError::Io(e).into()),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => write!(f, "<stdout>"),
            Output::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub inputs: InputOptions,
    /// Where the rendered redirects go.
    pub redirects: Option<Output>,
    /// Where the list of redirected binaries goes.
    pub target_files: Option<Output>,
    /// Compare against the recorded redirects file instead of writing it.
    pub assert: bool,
    /// List target files relative to their cache root.
    pub test_mode: bool,
}

/// What a generate run produced.
#[derive(Debug)]
pub struct GenerateOutcome {
    pub rendered: String,
    pub directives: Vec<RedirectDirective>,
    pub report: CuriousReport,
    pub libraries: usize,
}

/// Resolve the redirects described by `opts` and write the requested outputs.
///
/// Nothing is written until the whole directive list is known; a failed run
/// leaves every output untouched.
pub fn generate(opts: &GenerateOptions, reader: &dyn ModuleReader) -> miette::Result<GenerateOutcome> {
    if opts.assert && !matches!(opts.redirects, Some(Output::File(_))) {
        return Err(RebindError::Generic {
            message: "--assert needs a redirects file to compare against".to_string(),
        }
        .into());
    }

    let inputs = load_inputs(&opts.inputs)?;
    let ctx = inputs.context(reader);
    let resolution = resolve(&ctx, &inputs.manifests)?;
    let probing = inputs.private_probing_path.as_deref();
    let rendered = resolution.render(probing);
    info!("{} : {} redirects", inputs.focus, resolution.directives.len());

    if let Some(target) = &opts.redirects {
        match target {
            Output::File(path) if opts.assert => assert_recorded(path, &rendered)?,
            _ => target.write(&rendered)?,
        }
    }
    if let Some(target) = &opts.target_files {
        target.write(&target_files(&resolution.directives, opts.test_mode))?;
    }

    Ok(GenerateOutcome {
        rendered,
        libraries: resolution.libraries.libraries.len(),
        directives: resolution.directives,
        report: resolution.report,
    })
}

/// One line per redirected binary: cache-relative paths in test mode,
/// absolute paths otherwise.
pub fn target_files(directives: &[RedirectDirective], test_mode: bool) -> String {
    let mut lines: Vec<String> = directives
        .iter()
        .map(|d| {
            if test_mode {
                d.relative_path.clone()
            } else {
                d.source_path.to_string_lossy().into_owned()
            }
        })
        .collect();
    if test_mode {
        lines.sort();
    }
    lines.join("\n")
}

/// Fail unless `path` already holds `rendered`.
pub fn assert_recorded(path: &Path, rendered: &str) -> miette::Result<()> {
    if !path.exists() {
        if rendered.trim().is_empty() {
            return Ok(());
        }
        return Err(RebindError::Assertion {
            message: format!("Found some binding redirects, but {} does not exist.", path.display()),
        }
        .into());
    }
    let recorded = std::fs::read_to_string(path).map_err(RebindError::from)?;
    if recorded.trim_end() != rendered.trim_end() {
        return Err(RebindError::Assertion {
            message: format!(
                "Actual binding redirects in {} do not match the expectation.",
                path.display()
            ),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_parse() {
        assert_eq!(Output::parse("-"), Output::Stdout);
        assert_eq!(Output::parse("app.config"), Output::File(PathBuf::from("app.config")));
    }

    #[test]
    fn assert_against_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("redirects.xml");
        assert!(assert_recorded(&path, "  \n").is_ok());
        let err = assert_recorded(&path, "<dependentAssembly/>").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn assert_ignores_trailing_whitespace() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("redirects.xml");
        std::fs::write(&path, "<a/>\n<b/>\r\n").unwrap();
        assert!(assert_recorded(&path, "<a/>\n<b/>").is_ok());
        let err = assert_recorded(&path, "<a/>").unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn assert_requires_redirects_file() {
        let opts = GenerateOptions {
            assert: true,
            redirects: Some(Output::Stdout),
            ..Default::default()
        };
        let err = generate(&opts, &rebind_metadata::PeModuleReader::new()).unwrap_err();
        assert!(err.to_string().contains("needs a redirects file"));
    }
}
