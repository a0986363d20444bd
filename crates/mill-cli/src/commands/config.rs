use mill_config::MillConfig;

use crate::cli::GlobalFlags;
use crate::output::output;

pub fn handle(config: &MillConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    output(config, flags.format)
}
