//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Plugin manager - Install, update and manage git-hosted plugins
#[derive(Parser, Debug)]
#[command(name = "plugins")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to load instead of the default one
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to install plugins into
    #[arg(long, global = true, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List installed plugins
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show details of an installed plugin
    Info {
        /// Plugin id, UUID, name or registry id
        plugin: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Install a plugin from a git URL, local repository or registry id
    ///
    /// Examples:
    ///   plugins install https://github.com/example/my-plugin
    ///   plugins install my-plugin --ref v1.2.0
    ///   plugins install ~/src/my-plugin --enable
    Install {
        /// Git URL, local repository path or registry id
        source: String,

        /// Branch, tag or commit to install
        #[arg(short, long = "ref", value_name = "REF")]
        git_ref: Option<String>,

        /// Replace an installed plugin with the same UUID
        #[arg(long)]
        reinstall: bool,

        /// Install even if the registry blacklists the plugin
        #[arg(long)]
        force_blacklisted: bool,

        /// Overwrite local changes of the plugin being replaced
        #[arg(long)]
        discard_changes: bool,

        /// Enable the plugin after installing it
        #[arg(long)]
        enable: bool,
    },

    /// Uninstall a plugin
    #[command(visible_alias = "uninstall")]
    Remove {
        /// Plugin id, UUID, name or registry id
        plugin: String,

        /// Also delete the plugin's saved options
        #[arg(long)]
        purge: bool,
    },

    /// Enable an installed plugin
    Enable {
        /// Plugin id, UUID, name or registry id
        plugin: String,
    },

    /// Disable an installed plugin
    Disable {
        /// Plugin id, UUID, name or registry id
        plugin: String,
    },

    /// Update a plugin to the latest commit or version tag
    Update {
        /// Plugin id, UUID, name or registry id
        plugin: String,

        /// Throw away local changes instead of refusing to update
        #[arg(long)]
        discard_changes: bool,
    },

    /// Update every installed plugin
    UpdateAll {
        /// Throw away local changes instead of refusing to update
        #[arg(long)]
        discard_changes: bool,
    },

    /// List plugins with updates available
    CheckUpdates {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Check out another branch, tag or commit of a plugin
    SwitchRef {
        /// Plugin id, UUID, name or registry id
        plugin: String,

        /// Branch, tag or commit
        #[arg(value_name = "REF")]
        reference: String,

        /// Throw away local changes instead of refusing to switch
        #[arg(long)]
        discard_changes: bool,
    },

    /// List branches and tags of a plugin or repository
    ListRefs {
        /// Installed plugin, git URL, local repository or registry id
        target: String,

        /// Fetch again instead of using cached refs
        #[arg(long)]
        refresh: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Check that a repository contains a valid plugin
    Validate {
        /// Git URL or local path
        source: String,

        /// Branch, tag or commit to validate
        #[arg(short, long = "ref", value_name = "REF")]
        git_ref: Option<String>,
    },

    /// Print a plugin's manifest, or a template for a new one
    Manifest {
        /// Installed plugin; omit to print a template
        plugin: Option<String>,
    },

    /// Browse the plugin registry
    Browse {
        /// Only plugins in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only plugins with this trust level (official, trusted, community)
        #[arg(short, long)]
        trust: Option<String>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Search the plugin registry
    Search {
        /// Text to look for in plugin ids, names and descriptions
        query: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Fetch the registry again, bypassing the cache
    RefreshRegistry,

    /// Delete saved options of plugins that are no longer installed
    CleanConfig {
        /// Only this plugin UUID; all orphaned options when omitted
        uuid: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_install_with_options() {
        let cli = Cli::parse_from([
            "plugins",
            "install",
            "https://example.com/demo.git",
            "--ref",
            "v1.0.0",
            "--enable",
            "--yes",
        ]);
        assert!(cli.global.yes);
        assert_eq!(
            cli.command,
            Some(Commands::Install {
                source: "https://example.com/demo.git".into(),
                git_ref: Some("v1.0.0".into()),
                reinstall: false,
                force_blacklisted: false,
                discard_changes: false,
                enable: true,
            })
        );
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["plugins", "list", "--json", "--plugin-dir", "/tmp/p", "-v"]);
        assert!(cli.global.verbose);
        assert_eq!(cli.global.plugin_dir, Some(PathBuf::from("/tmp/p")));
        assert_eq!(cli.command, Some(Commands::List { json: true }));
    }

    #[test]
    fn parse_remove_alias() {
        let cli = Cli::parse_from(["plugins", "uninstall", "demo", "--purge"]);
        assert_eq!(
            cli.command,
            Some(Commands::Remove {
                plugin: "demo".into(),
                purge: true,
            })
        );
    }

    #[test]
    fn parse_switch_ref() {
        let cli = Cli::parse_from(["plugins", "switch-ref", "demo", "dev"]);
        assert_eq!(
            cli.command,
            Some(Commands::SwitchRef {
                plugin: "demo".into(),
                reference: "dev".into(),
                discard_changes: false,
            })
        );
    }
}
