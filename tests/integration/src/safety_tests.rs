//! Failure paths must leave installed plugins and stored state untouched.

mod world;

use std::fs;

use plugin_core::{Error, InstallOptions, PluginState};
use plugin_git::{Git2Backend, GitBackend, GitRepository};
use plugin_test_utils::PluginSource;
use plugin_test_utils::git::rev;
use world::{OTHER_UUID, UUID, World, ban};

fn published(uuid: &str, name: &str) -> PluginSource {
    let source = PluginSource::with_manifest(uuid, name, "1.0.0");
    source.publish();
    source
}

fn head_of(world: &World, plugin_id: &str) -> String {
    let repo = Git2Backend::new()
        .open(&world.plugin_dir().join(plugin_id))
        .unwrap();
    repo.head_target().unwrap()
}

// =============================================================================
// Rollback
// =============================================================================

mod rollback {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn broken_release_keeps_the_working_version() {
        let source = published(UUID, "Demo");
        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().enable(true))
            .unwrap();
        let manifest_digest = world.file_digest(&plugin_id, "MANIFEST.toml");
        let installed_head = head_of(&world, &plugin_id);

        source.write_file("MANIFEST.toml", "name = \"Demo\"\n");
        source.commit("Break the manifest");
        source.publish();

        let err = world.manager.update_plugin(&plugin_id, false).unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }), "got {err:?}");

        assert_eq!(world.file_digest(&plugin_id, "MANIFEST.toml"), manifest_digest);
        assert_eq!(head_of(&world, &plugin_id), installed_head);
        assert_eq!(world.metadata(&plugin_id).commit, installed_head);

        let report = world.restart();
        assert!(report.failed.is_empty());
        assert_eq!(report.enabled, vec![plugin_id.clone()]);
        assert_eq!(world.manager.plugin(&plugin_id).unwrap().version(), "1.0.0");
    }

    #[test]
    fn failed_install_leaves_no_trace() {
        let source = PluginSource::new();
        source.write_file("MANIFEST.toml", "uuid = \"not-a-uuid\"\n");
        source.commit("Initial");
        source.publish();
        let mut world = World::new();

        let err = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }), "got {err:?}");

        let leftovers: Vec<_> = fs::read_dir(world.plugin_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
        assert!(world.metadata_records().is_empty());
    }

    #[test]
    fn interrupted_install_is_swept_on_start() {
        let mut world = World::new();
        let stale = world.plugin_dir().join(".tmp-plugin-interrupted");
        fs::create_dir_all(stale.join("partial")).unwrap();

        let report = world.restart();
        assert_eq!(report.swept, 1);
        assert!(!stale.exists());
        assert!(report.failed.is_empty());
    }
}

// =============================================================================
// Identity conflicts
// =============================================================================

mod conflicts {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_uuid_from_a_fork_is_refused() {
        let original = published(UUID, "Demo");
        let fork = published(UUID, "Demo Fork");
        let mut world = World::new();
        let plugin_id = world
            .manager
            .install_plugin(&original.bare_url(), InstallOptions::default().enable(true))
            .unwrap();
        let before = world.metadata(&plugin_id);

        let err = world
            .manager
            .install_plugin(&fork.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UuidConflict { .. }), "got {err:?}");

        assert_eq!(world.manager.plugins().len(), 1);
        assert_eq!(world.metadata(&plugin_id), before);
        assert_eq!(
            world.manager.plugin(&plugin_id).unwrap().state,
            PluginState::Enabled
        );
        assert!(!world.plugin_dir().join(format!("demo_fork_{UUID}")).exists());
    }

    #[test]
    fn one_metadata_record_per_uuid() {
        let source = published(UUID, "Demo");
        source.tag("v1.0.0");
        source.write_manifest(UUID, "Demo", "1.1.0");
        source.commit("Release 1.1.0");
        source.publish();
        let other = published(OTHER_UUID, "Other");
        let mut world = World::new();

        let plugin_id = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();
        world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().reinstall(true))
            .unwrap();
        world.manager.switch_ref(&plugin_id, "v1.0.0", false).unwrap();
        world.manager.switch_ref(&plugin_id, "main", false).unwrap();
        world.manager.update_plugin(&plugin_id, false).unwrap();
        world
            .manager
            .install_plugin(&other.bare_url(), InstallOptions::default())
            .unwrap();

        let records = world.metadata_records();
        assert_eq!(
            records.keys().cloned().collect::<Vec<_>>(),
            vec![UUID.to_string(), OTHER_UUID.to_string()]
        );
        assert_eq!(records[UUID]["ref"], "main");
        assert_eq!(records[UUID]["commit"], rev(&source.bare_path(), "main").as_str());
    }
}

// =============================================================================
// Blacklist precedence
// =============================================================================

mod blacklist {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pair_entry_only_blocks_its_own_url() {
        let source = published(UUID, "Demo");
        let mut world = World::with_registry(
            &[],
            &[&ban(Some(UUID), Some("https://example.com/other.git"), "Bad mirror")],
        );

        world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();
    }

    #[test]
    fn uuid_entry_blocks_every_source() {
        let source = published(UUID, "Demo");
        let mut world = World::with_registry(&[], &[&ban(Some(UUID), None, "Malware")]);

        let err = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Blacklisted { .. }), "got {err:?}");
        assert!(err.to_string().contains("Malware"));
        assert!(world.manager.plugins().is_empty());

        world
            .manager
            .install_plugin(
                &source.bare_url(),
                InstallOptions::default().force_blacklisted(true),
            )
            .unwrap();
        assert_eq!(world.manager.plugins().len(), 1);
    }

    #[test]
    fn url_entry_blocks_before_cloning() {
        let source = published(UUID, "Demo");
        let mut world = World::with_registry(&[], &[&ban(None, Some(&source.bare_url()), "Gone rogue")]);

        let err = world
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Blacklisted { .. }), "got {err:?}");
        assert!(fs::read_dir(world.plugin_dir()).unwrap().next().is_none());
    }
}
