//! Command dispatch and handler modules.

mod generate;
mod usage;

use std::path::Path;

use miette::Result;
use rebind_core::workspace::WORKSPACE_FILE;
use rebind_ops::inputs::InputOptions;

use crate::cli::{Cli, Command, InputArgs};

/// Route a parsed CLI invocation to its command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    tracing::debug!("rebind {}", env!("CARGO_PKG_VERSION"));
    match cli.command {
        Command::Generate {
            input,
            redirects,
            target_files,
            assert,
            test_mode,
            usage_report,
        } => generate::exec(
            input_options(input),
            redirects.as_deref(),
            target_files.as_deref(),
            assert,
            test_mode,
            usage_report,
            cli.verbose,
        ),
        Command::Usage { input, output } => usage::exec(input_options(input), output),
    }
}

/// Without `--workspace` or `--assets`, use `rebind.toml` from the current
/// directory when there is one.
fn input_options(args: InputArgs) -> InputOptions {
    let workspace = args.workspace.or_else(|| {
        let candidate = Path::new(WORKSPACE_FILE);
        (args.assets.is_empty() && candidate.is_file()).then(|| candidate.to_path_buf())
    });
    InputOptions {
        workspace,
        project: args.project,
        assets: args.assets,
        package_roots: args.package_roots,
        redist_list: args.redist_list,
        private_probing_path: args.private_probing_path,
    }
}
