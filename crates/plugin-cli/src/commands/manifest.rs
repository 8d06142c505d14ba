//! Manifest command

use plugin_core::{MANIFEST_FILE, manifest_template};

use crate::context::Context;
use crate::error::{CliError, Result};

/// Print an installed plugin's `MANIFEST.toml` as it is on disk.
pub fn run_manifest(ctx: &mut Context, identifier: &str) -> Result<()> {
    let plugin_id = ctx.find_plugin(identifier)?;
    let Some(plugin) = ctx.manager.plugin(&plugin_id) else {
        return Err(CliError::user(format!("Plugin not found: {plugin_id}")));
    };
    print!("{}", std::fs::read_to_string(plugin.path.join(MANIFEST_FILE))?);
    Ok(())
}

/// Print a manifest template with a freshly generated UUID.
pub fn run_manifest_template() {
    print!("{}", manifest_template(&uuid::Uuid::new_v4().to_string()));
}
