//! CLI argument definitions for rebind.
//!
//! Uses `clap` derive macros for the command surface. Each command has a
//! handler in [`super::commands`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "rebind",
    version,
    about = "Compute assembly binding redirects from restored packages",
    long_about = "rebind merges the restore output of a project and the projects it \
                  references, finds every module requested at more than one version, \
                  and emits the binding redirects the loader needs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every resolution decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate binding redirects
    Generate {
        #[command(flatten)]
        input: InputArgs,
        /// Redirects output file, `-` for stdout
        #[arg(long, value_name = "FILE")]
        redirects: Option<String>,
        /// List of redirected binaries, `-` for stdout
        #[arg(long, value_name = "FILE")]
        target_files: Option<String>,
        /// Fail unless the redirects file already holds the computed redirects
        #[arg(long, requires = "redirects")]
        assert: bool,
        /// List target files relative to their package cache root
        #[arg(long = "test")]
        test_mode: bool,
        /// Also write the package usage report (file or directory)
        #[arg(long, value_name = "PATH")]
        usage_report: Option<PathBuf>,
    },

    /// Write the package usage report
    Usage {
        #[command(flatten)]
        input: InputArgs,
        /// Report file or directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

/// Where the project manifests come from.
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Workspace description file [default: ./rebind.toml when present]
    #[arg(short, long, value_name = "FILE", conflicts_with = "assets")]
    pub workspace: Option<PathBuf>,
    /// Focus project of the workspace
    #[arg(short, long)]
    pub project: Option<String>,
    /// project.assets.json files to merge, in order
    #[arg(long, value_name = "FILE", num_args = 1..)]
    pub assets: Vec<PathBuf>,
    /// Package cache root, tried before the recorded ones (repeatable)
    #[arg(long = "package-root", value_name = "DIR")]
    pub package_roots: Vec<PathBuf>,
    /// Framework redistribution list
    #[arg(long, value_name = "FILE")]
    pub redist_list: Option<PathBuf>,
    /// Private probing path; adds a codeBase to every redirect
    #[arg(long, value_name = "PATH")]
    pub private_probing_path: Option<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
