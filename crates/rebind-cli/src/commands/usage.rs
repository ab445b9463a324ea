use std::path::PathBuf;

use miette::Result;
use rebind_metadata::PeModuleReader;
use rebind_ops::inputs::InputOptions;
use rebind_ops::ops_usage::{usage, UsageOptions};
use rebind_util::progress::status;

pub fn exec(inputs: InputOptions, output: PathBuf) -> Result<()> {
    let path = usage(&UsageOptions { inputs, output }, &PeModuleReader::new())?;
    status("Reported", &format!("package usage into {}", path.display()));
    Ok(())
}
