//! Config command - print the effective stream configuration

use anyhow::Result;
use ssec::StreamConfig;

use crate::output::OutputContext;

/// Print `config` after file and flag overrides have been applied
pub fn show_config(config: &StreamConfig, ctx: &OutputContext) -> Result<()> {
    if let Err(e) = config.validate() {
        ctx.warn(&format!("Configuration is not usable: {}", e));
    }
    ctx.print_config(config)
}
