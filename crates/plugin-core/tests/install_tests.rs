//! Tests for installing plugins from git sources

mod common;

use std::fs;

use common::{Harness, OTHER_UUID, UUID, registry_entry};
use plugin_core::{ErrorKind, InstallOptions, PluginEvent, PluginState};
use plugin_registry::normalize_git_url;
use plugin_test_utils::PluginSource;
use plugin_test_utils::git::{non_git_dir, rev};

fn published(name: &str, version: &str) -> PluginSource {
    let source = PluginSource::with_manifest(UUID, name, version);
    source.publish();
    source
}

mod round_trip {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn install_from_bare_repository_records_source() {
        let source = published("Demo Plugin", "1.0.0");
        let mut h = Harness::new();

        let plugin_id = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap();

        assert_eq!(plugin_id, format!("demo_plugin_{UUID}"));
        let path = h.primary_dir().join(&plugin_id);
        assert!(path.join("MANIFEST.toml").is_file());
        assert_eq!(rev(&path, "HEAD"), source.head());

        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.url, normalize_git_url(&source.bare_url()));
        assert_eq!(metadata.git_ref, "main");
        assert_eq!(metadata.ref_type.as_deref(), Some("branch"));
        assert_eq!(metadata.commit, source.head());
        assert_eq!(metadata.uuid.as_deref(), Some(UUID));

        let plugin = h.manager.plugin(&plugin_id).unwrap();
        assert_eq!(plugin.state, PluginState::Loaded);
        assert_eq!(plugin.version(), "1.0.0");
        assert_eq!(h.manager.uuid_registry().plugin_id(UUID), Some(plugin_id.as_str()));
        assert_eq!(
            h.hooks.events.borrow().as_slice(),
            &[PluginEvent::Installed { plugin_id }]
        );
    }

    #[test]
    fn install_at_tag_records_tag_and_peeled_commit() {
        let source = PluginSource::with_manifest(UUID, "Demo", "1.0.0");
        source.annotated_tag("v1.0.0", "First release");
        let tagged = source.head();
        source.write_manifest(UUID, "Demo", "1.1.0");
        source.commit("Next");
        source.publish();
        let mut h = Harness::new();

        let plugin_id = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().git_ref("v1.0.0"))
            .unwrap();

        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.git_ref, "v1.0.0");
        assert_eq!(metadata.ref_type.as_deref(), Some("tag"));
        assert_eq!(metadata.commit, tagged);
        assert_eq!(h.manager.plugin(&plugin_id).unwrap().version(), "1.0.0");
    }

    #[test]
    fn install_at_commit_records_a_pin() {
        let source = PluginSource::with_manifest(UUID, "Demo", "1.0.0");
        let first = source.head();
        source.write_file("extra.py", "x = 1\n");
        source.commit("Second");
        source.publish();
        let mut h = Harness::new();

        let plugin_id = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().git_ref(&first[..10]))
            .unwrap();

        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.ref_type.as_deref(), Some("commit"));
        assert_eq!(metadata.commit, first);
    }

    #[test]
    fn local_working_copy_installs_its_current_branch() {
        let source = PluginSource::with_manifest(UUID, "Demo", "1.0.0");
        source.branch("feature");
        source.checkout_branch("feature");
        source.write_manifest(UUID, "Demo", "2.0.0-dev");
        source.commit("Feature work");
        let mut h = Harness::new();

        let source_path = source.work_path().to_string_lossy().into_owned();
        let plugin_id = h
            .manager
            .install_plugin(&source_path, InstallOptions::default())
            .unwrap();

        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.git_ref, "feature");
        assert_eq!(h.manager.plugin(&plugin_id).unwrap().version(), "2.0.0-dev");
    }

    #[test]
    fn enable_option_enables_after_install() {
        let source = published("Demo", "1.0.0");
        let mut h = Harness::new();

        let plugin_id = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().enable(true))
            .unwrap();

        assert!(h.manager.plugin(&plugin_id).unwrap().is_enabled());
        assert!(h.manager.enabled_uuids().contains(UUID));
        assert_eq!(h.calls(), vec![format!("enable {plugin_id}")]);
    }
}

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_directory_is_not_a_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain");
        non_git_dir(&path);
        let mut h = Harness::new();

        let err = h
            .manager
            .install_plugin(&path.to_string_lossy(), InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotARepository);
    }

    #[test]
    fn missing_ref_is_reported_and_nothing_is_left_behind() {
        let source = published("Demo", "1.0.0");
        let mut h = Harness::new();

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().git_ref("v9.9.9"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RefNotFound);
        let leftovers: Vec<_> = fs::read_dir(h.primary_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn invalid_manifest_is_rejected() {
        let source = PluginSource::new();
        source.write_file("MANIFEST.toml", "name = \"No UUID\"\n");
        source.commit("Broken");
        source.publish();
        let mut h = Harness::new();

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ManifestInvalid);
        assert!(h.manager.plugins().is_empty());
    }

    #[test]
    fn repository_without_manifest_is_rejected() {
        let source = PluginSource::new();
        source.write_file("README.md", "hello");
        source.commit("No manifest");
        source.publish();
        let mut h = Harness::new();

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestNotFound);
    }

    #[test]
    fn already_installed_without_reinstall() {
        let source = published("Demo", "1.0.0");
        let mut h = Harness::new();
        let url = source.bare_url();
        let plugin_id = h.manager.install_plugin(&url, InstallOptions::default()).unwrap();

        let err = h
            .manager
            .install_plugin(&url, InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInstalled);
        assert!(err.to_string().contains(&plugin_id));
    }

    #[test]
    fn failing_enable_hook_removes_the_install() {
        let source = published("Demo", "1.0.0");
        let mut h = Harness::new();
        h.hooks.fail_enable.set(true);

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default().enable(true))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Hook);
        assert!(h.manager.plugins().is_empty());
        assert!(!h.primary_dir().join(format!("demo_{UUID}")).exists());
        assert!(!h.manager.uuid_registry().contains(UUID));
        assert!(!h.manager.enabled_uuids().contains(UUID));
    }
}

mod blacklist {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blacklisted_url_is_refused_unless_forced() {
        let source = published("Demo", "1.0.0");
        let url = normalize_git_url(&source.bare_url());
        let entry = format!(
            r#"{{"url": {}, "reason": "Ships malware"}}"#,
            serde_json::to_string(&url).unwrap()
        );
        let mut h = Harness::with_registry(&[], &[&entry]);

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blacklisted);
        assert!(err.to_string().contains("Ships malware"));

        h.manager
            .install_plugin(&source.bare_url(), InstallOptions::default().force_blacklisted(true))
            .unwrap();
    }

    #[test]
    fn uuid_only_entry_beats_pair_for_another_url() {
        let source = published("Demo", "1.0.0");
        let r1 = format!(r#"{{"uuid": "{UUID}", "url": "https://example.com/other.git", "reason": "r1"}}"#);
        let r2 = format!(r#"{{"uuid": "{UUID}", "reason": "r2"}}"#);
        let mut h = Harness::with_registry(&[], &[&r1, &r2]);

        let err = h
            .manager
            .install_plugin(&source.bare_url(), InstallOptions::default())
            .unwrap_err();

        match err {
            plugin_core::Error::Blacklisted { reason, uuid, .. } => {
                assert_eq!(reason, "r2");
                assert_eq!(uuid.as_deref(), Some(UUID));
            }
            other => panic!("expected a blacklist error, got {other}"),
        }
    }
}

mod reinstall {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn same_uuid_from_another_source_conflicts() {
        let first = published("Demo", "1.0.0");
        let second = published("Demo", "1.0.0");
        let mut h = Harness::new();
        h.manager
            .install_plugin(&first.bare_url(), InstallOptions::default())
            .unwrap();

        let err = h
            .manager
            .install_plugin(&second.bare_url(), InstallOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UuidConflict);
        assert!(err.to_string().contains(&normalize_git_url(&first.bare_url())));

        let plugin_id = h
            .manager
            .install_plugin(&second.bare_url(), InstallOptions::default().reinstall(true))
            .unwrap();
        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.url, normalize_git_url(&second.bare_url()));
        assert_eq!(h.manager.plugins().len(), 1);
    }

    #[test]
    fn reinstall_keeps_the_installed_tag() {
        let source = PluginSource::with_manifest(UUID, "Demo", "1.0.0");
        source.tag("v1.0.0");
        source.write_manifest(UUID, "Demo", "1.1.0");
        source.commit("Next");
        source.publish();
        let url = source.bare_url();
        let mut h = Harness::new();
        h.manager
            .install_plugin(&url, InstallOptions::default().git_ref("v1.0.0"))
            .unwrap();

        let plugin_id = h
            .manager
            .install_plugin(&url, InstallOptions::default().reinstall(true))
            .unwrap();

        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.git_ref, "v1.0.0");
        assert_eq!(h.manager.plugin(&plugin_id).unwrap().version(), "1.0.0");
    }

    #[test]
    fn reinstall_refuses_to_overwrite_local_changes() {
        let source = published("Demo", "1.0.0");
        let url = source.bare_url();
        let mut h = Harness::new();
        let plugin_id = h.manager.install_plugin(&url, InstallOptions::default()).unwrap();
        let path = h.primary_dir().join(&plugin_id);
        fs::write(path.join("__init__.py"), "print('patched')\n").unwrap();

        let err = h
            .manager
            .install_plugin(&url, InstallOptions::default().reinstall(true))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dirty);

        h.manager
            .install_plugin(&url, InstallOptions::default().reinstall(true).discard_changes(true))
            .unwrap();
        assert_eq!(fs::read_to_string(path.join("__init__.py")).unwrap(), "");
    }

    #[test]
    fn reinstall_swaps_the_directory_without_leftovers() {
        let source = published("Demo", "1.0.0");
        let url = source.bare_url();
        let mut h = Harness::new();
        let plugin_id = h
            .manager
            .install_plugin(&url, InstallOptions::default().enable(true))
            .unwrap();
        source.write_manifest(UUID, "Demo", "1.1.0");
        source.commit("Release 1.1.0");
        source.publish();

        h.manager
            .install_plugin(&url, InstallOptions::default().reinstall(true))
            .unwrap();

        let entries: Vec<String> = fs::read_dir(h.primary_dir())
            .unwrap()
            .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
            .collect();
        assert_eq!(entries, vec![plugin_id.clone()]);
        assert_eq!(h.manager.plugin(&plugin_id).unwrap().version(), "1.1.0");
        assert_eq!(h.manager.plugins().len(), 1);

        h.restart();
        let report = h.manager.init_plugins().unwrap();
        assert_eq!(report.swept, 0);
        assert_eq!(report.loaded, 1);
    }

    #[test]
    fn renamed_plugin_replaces_the_old_directory() {
        let source = published("Demo", "1.0.0");
        let url = source.bare_url();
        let mut h = Harness::new();
        let old_id = h.manager.install_plugin(&url, InstallOptions::default()).unwrap();

        source.write_manifest(UUID, "Demo Renamed", "1.1.0");
        source.commit("Rename");
        source.publish();
        let new_id = h
            .manager
            .install_plugin(&url, InstallOptions::default().reinstall(true))
            .unwrap();

        assert_ne!(old_id, new_id);
        assert!(!h.primary_dir().join(&old_id).exists());
        assert_eq!(h.manager.plugins().len(), 1);
        assert_eq!(h.manager.uuid_registry().plugin_id(UUID), Some(new_id.as_str()));
    }
}

mod registry_refs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_versioning_picks_newest_tag_without_a_branch() {
        let source = PluginSource::with_manifest(OTHER_UUID, "Versioned", "1.0.0");
        source.tag("v1.0.0");
        source.write_manifest(OTHER_UUID, "Versioned", "1.2.0");
        source.commit("1.2.0");
        source.tag("v1.2.0");
        source.write_manifest(OTHER_UUID, "Versioned", "2.0.0-dev");
        source.commit("Unreleased");
        let first = source.repo().revparse_single("v1.0.0").unwrap().id();
        source.repo().set_head_detached(first).unwrap();

        let url = source.work_path().to_string_lossy().into_owned();
        let entry = registry_entry("versioned", OTHER_UUID, &url, r#""versioning_scheme": "semver""#);
        let mut h = Harness::with_registry(&[&entry], &[]);

        let plugin_id = h
            .manager
            .install_plugin(&url, InstallOptions::default())
            .unwrap();

        assert_eq!(h.manager.plugin(&plugin_id).unwrap().version(), "1.2.0");
        let metadata = h.manager.plugin_metadata(&plugin_id).unwrap().unwrap();
        assert_eq!(metadata.git_ref, "v1.2.0");
        assert_eq!(metadata.ref_type.as_deref(), Some("tag"));
    }
}
