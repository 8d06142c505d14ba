//! Command implementations for plugin-cli

pub mod install;
pub mod manifest;
pub mod plugins;
pub mod registry;
pub mod update;

pub use install::{InstallArgs, run_install, run_validate};
pub use manifest::{run_manifest, run_manifest_template};
pub use plugins::{run_clean_config, run_disable, run_enable, run_info, run_list, run_remove};
pub use registry::{run_browse, run_refresh_registry, run_search};
pub use update::{run_check_updates, run_list_refs, run_switch_ref, run_update, run_update_all};
