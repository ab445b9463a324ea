use std::path::PathBuf;

use miette::Result;
use rebind_metadata::PeModuleReader;
use rebind_ops::inputs::InputOptions;
use rebind_ops::ops_generate::{generate, GenerateOptions, Output};
use rebind_ops::ops_usage::{usage, UsageOptions};
use rebind_util::progress::{status, status_info, status_warn};

pub fn exec(
    inputs: InputOptions,
    redirects: Option<&str>,
    target_files: Option<&str>,
    assert: bool,
    test_mode: bool,
    usage_report: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let redirects = match (redirects, target_files) {
        (None, None) => Some(Output::Stdout),
        (r, _) => r.map(Output::parse),
    };
    let opts = GenerateOptions {
        inputs,
        redirects,
        target_files: target_files.map(Output::parse),
        assert,
        test_mode,
    };

    let reader = PeModuleReader::new();
    let outcome = generate(&opts, &reader)?;

    if verbose {
        eprintln!("{}", outcome.report);
    } else if !outcome.report.is_empty() {
        status_warn(
            "Curious",
            &format!("{} cases, re-run with --verbose to list them", outcome.report.len()),
        );
    }
    let summary = format!(
        "{} redirects from {} libraries",
        outcome.directives.len(),
        outcome.libraries
    );
    match &opts.redirects {
        Some(target @ Output::File(_)) if assert => status("Verified", &format!("{summary} in {target}")),
        Some(target @ Output::File(_)) => status("Generated", &format!("{summary} into {target}")),
        _ => status("Resolved", &summary),
    }
    if let Some(target) = &opts.target_files {
        status_info("Listed", &format!("target files into {target}"));
    }

    if let Some(output) = usage_report {
        let path = usage(
            &UsageOptions {
                inputs: opts.inputs.clone(),
                output,
            },
            &reader,
        )?;
        status_info("Reported", &format!("package usage into {}", path.display()));
    }
    Ok(())
}
