//! End-to-end workflows across manager restarts
//!
//! Every test drives a real manager: libgit2 clones from bare repositories,
//! a JSON settings file and a registry document read from disk.

mod world;

use plugin_core::{InstallOptions, PluginState};
use plugin_registry::TrustLevel;
use plugin_test_utils::PluginSource;
use plugin_test_utils::git::rev;
use serde_json::json;
use world::{OTHER_UUID, UUID, World, entry};

fn published(uuid: &str, name: &str) -> PluginSource {
    let source = PluginSource::with_manifest(uuid, name, "1.0.0");
    source.tag("v1.0.0");
    source.publish();
    source
}

// =============================================================================
// Host session: install, restart, update, uninstall
// =============================================================================

mod host_session {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_plugin_lifecycle() {
        let source = published(UUID, "Demo");
        let mut world = World::new();

        // Install and enable
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().enable(true))
            .unwrap();
        assert_eq!(plugin_id, format!("demo_{UUID}"));
        assert!(world.plugin_dir().join(&plugin_id).join("MANIFEST.toml").exists());
        assert_eq!(world.settings()["plugins.enabled"], json!([UUID]));

        // Restart: the plugin comes back enabled
        let report = world.restart();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.enabled, vec![plugin_id.clone()]);

        // Upstream release, then update
        source.write_manifest(UUID, "Demo", "1.1.0");
        let head = source.commit("Release 1.1.0");
        source.publish();
        let result = world.manager.update_plugin(&plugin_id, false).unwrap();
        assert_eq!(result.new_version, "1.1.0");
        assert_eq!(world.metadata(&plugin_id).commit, head);

        // Restart again: the update is what gets loaded
        world.restart();
        let plugin = world.manager.plugin(&plugin_id).unwrap();
        assert_eq!(plugin.version(), "1.1.0");
        assert_eq!(plugin.state, PluginState::Enabled);

        // Uninstall
        world.manager.uninstall_plugin(&plugin_id, false).unwrap();
        assert!(!world.plugin_dir().join(&plugin_id).exists());
        assert!(world.metadata_records().is_empty());
        assert_eq!(world.settings()["plugins.enabled"], json!([]));

        let report = world.restart();
        assert_eq!(report.loaded, 0);
    }

    #[test]
    fn options_survive_uninstall_and_reinstall() {
        let source = published(UUID, "Demo");
        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();

        // The plugin saves its options through the host settings
        {
            let path = world.root.path().join("settings.json");
            let mut settings: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            settings[format!("plugin.{UUID}")] = json!({"volume": 11});
            std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        }
        world.restart();

        world.manager.uninstall_plugin(&plugin_id, false).unwrap();
        assert_eq!(world.manager.orphaned_configs(), vec![UUID.to_string()]);

        world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();
        assert!(world.manager.orphaned_configs().is_empty());
        assert_eq!(world.settings()[format!("plugin.{UUID}")], json!({"volume": 11}));
    }

    #[test]
    fn two_plugins_are_independent() {
        let first = published(UUID, "First");
        let second = published(OTHER_UUID, "Second");
        let mut world = World::new();

        let first_id = world
            .manager
            .install_plugin(&first.bare_url(), InstallOptions::default().enable(true))
            .unwrap();
        let second_id = world
            .manager
            .install_plugin(&second.bare_url(), InstallOptions::default())
            .unwrap();

        world.manager.uninstall_plugin(&first_id, true).unwrap();
        world.restart();

        assert!(world.manager.plugin(&first_id).is_none());
        let second = world.manager.plugin(&second_id).unwrap();
        assert_eq!(second.state, PluginState::Loaded);
        assert_eq!(
            world.metadata_records().keys().cloned().collect::<Vec<_>>(),
            vec![OTHER_UUID.to_string()]
        );
    }
}

// =============================================================================
// Registry document read from disk
// =============================================================================

mod registry_document {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn install_by_registry_id() {
        let source = published(UUID, "Demo");
        let mut world = World::with_registry(
            &[&entry("demo", UUID, &source.bare_url(), r#""trust_level": "official""#)],
            &[],
        );

        let resolved = world.manager.resolve_source("demo");
        assert_eq!(resolved, source.bare_url());
        let plugin_id = world
            .manager
            .install_plugin(&resolved, InstallOptions::default())
            .unwrap();

        let url = world.metadata(&plugin_id).url;
        let registry = world.manager.registry();
        assert_eq!(registry.get_trust_level(&url), TrustLevel::Official);
        assert_eq!(
            registry.get_registry_id(Some(&url), Some(UUID)),
            Some("demo".to_string())
        );
        assert_eq!(world.manager.find_plugin("demo").unwrap(), plugin_id);
    }

    #[test]
    fn newly_blacklisted_plugin_is_disabled_on_next_start() {
        let source = published(UUID, "Demo");
        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().enable(true))
            .unwrap();

        world.publish_registry(&[], &[&world::ban(Some(UUID), None, "Steals passwords")]);
        let report = world.restart();

        assert_eq!(
            report.blacklisted,
            vec![(plugin_id.clone(), "Steals passwords".to_string())]
        );
        assert!(report.enabled.is_empty());
        assert_eq!(
            world.manager.plugin(&plugin_id).unwrap().state,
            PluginState::Disabled
        );
        assert_eq!(world.settings()["plugins.enabled"], json!([]));
    }

    #[test]
    fn refresh_reads_the_new_document() {
        let mut world = World::with_registry(&[&entry("demo", UUID, "https://example.com/demo.git", "")], &[]);
        assert_eq!(world.manager.registry().list_plugins(None, None).len(), 1);

        world.publish_registry(
            &[
                &entry("demo", UUID, "https://example.com/demo.git", ""),
                &entry("other", OTHER_UUID, "https://example.com/other.git", ""),
            ],
            &[],
        );
        world.manager.registry().refresh().unwrap();

        let info = world.manager.registry().get_registry_info().unwrap();
        assert_eq!(info.plugin_count, 2);
    }
}

// =============================================================================
// Refs
// =============================================================================

mod refs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn branch_wins_over_tag_with_the_same_name() {
        let source = published(UUID, "Demo");
        source.branch("dev");
        source.checkout_branch("dev");
        source.write_file("dev.txt", "branch only");
        let dev_head = source.commit("Work on dev");
        source.checkout_branch("main");
        source.tag("dev");
        source.publish();

        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().git_ref("dev"))
            .unwrap();

        let metadata = world.metadata(&plugin_id);
        assert_eq!(metadata.ref_type.as_deref(), Some("branch"));
        assert_eq!(metadata.commit, dev_head);
        assert!(world.plugin_dir().join(&plugin_id).join("dev.txt").exists());
    }

    #[test]
    fn switched_ref_persists_across_restart() {
        let source = published(UUID, "Demo");
        source.write_manifest(UUID, "Demo", "2.0.0");
        source.commit("Release 2.0.0");
        source.publish();

        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();
        assert_eq!(world.manager.plugin(&plugin_id).unwrap().version(), "2.0.0");

        world.manager.switch_ref(&plugin_id, "v1.0.0", false).unwrap();
        world.restart();

        assert_eq!(world.manager.plugin(&plugin_id).unwrap().version(), "1.0.0");
        let metadata = world.metadata(&plugin_id);
        assert_eq!(metadata.git_ref, "v1.0.0");
        assert_eq!(metadata.ref_type.as_deref(), Some("tag"));
        assert_eq!(metadata.commit, rev(&source.bare_path(), "v1.0.0"));
    }
}
