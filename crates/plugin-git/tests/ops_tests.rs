use std::fs;
use std::path::{Path, PathBuf};

use plugin_git::{
    Error, Git2Backend, GitBackend, RefType, check_dirty_working_dir, check_ref_type, short_id,
    switch_ref,
};
use plugin_test_utils::PluginSource;
use plugin_test_utils::git::rev;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Clone the published source into a fresh temp dir.
fn clone(source: &PluginSource) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plugin");
    Git2Backend::new()
        .clone_repository(&source.bare_url(), &path, None)
        .unwrap();
    (dir, path)
}

fn head_is_detached(path: &Path) -> bool {
    Git2Backend::new().open(path).unwrap().is_head_detached().unwrap()
}

#[test]
fn clean_clone_is_not_dirty() {
    let source = PluginSource::with_manifest(UUID, "Dirty", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    assert!(check_dirty_working_dir(&Git2Backend::new(), &path).unwrap().is_empty());
}

#[test]
fn build_cache_files_do_not_count_as_changes() {
    let source = PluginSource::with_manifest(UUID, "Dirty", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    fs::create_dir_all(path.join("__pycache__")).unwrap();
    fs::write(path.join("__pycache__/mod.cpython-312.pyc"), b"\0").unwrap();
    fs::write(path.join("stray.pyo"), b"\0").unwrap();

    assert!(check_dirty_working_dir(&Git2Backend::new(), &path).unwrap().is_empty());
}

#[test]
fn edited_and_new_files_are_reported() {
    let source = PluginSource::with_manifest(UUID, "Dirty", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    fs::write(path.join("MANIFEST.toml"), "edited").unwrap();
    fs::write(path.join("notes.txt"), "new").unwrap();

    let changes = check_dirty_working_dir(&Git2Backend::new(), &path).unwrap();
    assert_eq!(changes, vec!["MANIFEST.toml".to_string(), "notes.txt".to_string()]);
}

fn classified_source() -> PluginSource {
    let source = PluginSource::with_manifest(UUID, "Refs", "1.0.0");
    source.tag("v1.0.0");
    source.branch("dev");
    source.publish();
    source
}

#[rstest]
#[case("v1.0.0", RefType::Tag)]
#[case("main", RefType::Branch)]
#[case("dev", RefType::Branch)]
#[case("does-not-exist", RefType::Unknown)]
fn check_ref_type_classifies_names(#[case] reference: &str, #[case] expected: RefType) {
    let source = classified_source();
    let (_dir, path) = clone(&source);

    let (ref_type, name) = check_ref_type(&Git2Backend::new(), &path, Some(reference)).unwrap();
    assert_eq!(ref_type, expected);
    assert_eq!(name, reference);
}

#[test]
fn check_ref_type_recognises_raw_commits() {
    let source = classified_source();
    let (_dir, path) = clone(&source);

    let (ref_type, _) = check_ref_type(&Git2Backend::new(), &path, Some(&source.head())).unwrap();
    assert_eq!(ref_type, RefType::Commit);
}

#[test]
fn check_ref_type_without_ref_describes_head() {
    let source = classified_source();
    let (_dir, path) = clone(&source);
    let backend = Git2Backend::new();

    assert_eq!(
        check_ref_type(&backend, &path, None).unwrap(),
        (RefType::Branch, "main".to_string())
    );

    switch_ref(&backend, &path, &source.head()).unwrap();
    assert_eq!(
        check_ref_type(&backend, &path, None).unwrap(),
        (RefType::Commit, short_id(&source.head()))
    );
}

#[test]
fn branch_wins_over_tag_with_same_name() {
    let source = PluginSource::with_manifest(UUID, "Ambiguous", "1.0.0");
    let tagged = source.head();
    source.tag("v1");
    source.write_manifest(UUID, "Ambiguous", "1.1.0");
    let branched = source.commit("Release 1.1.0");
    source.branch("v1");
    source.publish();
    let (_dir, path) = clone(&source);

    let outcome = switch_ref(&Git2Backend::new(), &path, "v1").unwrap();

    assert_eq!(outcome.ref_type, RefType::Branch);
    assert_eq!(outcome.new_commit, branched);
    assert_ne!(outcome.new_commit, tagged);
    assert!(!head_is_detached(&path));
}

#[test]
fn tag_switch_detaches_head() {
    let source = PluginSource::with_manifest(UUID, "Tagged", "1.0.0");
    let first = source.head();
    source.annotated_tag("v1.0.0", "First");
    source.write_manifest(UUID, "Tagged", "2.0.0");
    source.commit("Release 2.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    let outcome = switch_ref(&Git2Backend::new(), &path, "v1.0.0").unwrap();

    assert_eq!(outcome.ref_type, RefType::Tag);
    assert_eq!(outcome.old_ref, "main");
    assert_eq!(outcome.new_ref, "v1.0.0");
    assert_eq!(outcome.new_commit, first);
    assert!(head_is_detached(&path));
    let manifest = fs::read_to_string(path.join("MANIFEST.toml")).unwrap();
    assert!(manifest.contains(r#"version = "1.0.0""#));
}

#[test]
fn tag_published_after_clone_is_fetched() {
    let source = PluginSource::with_manifest(UUID, "Late", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    source.write_manifest(UUID, "Late", "1.1.0");
    let released = source.commit("Release 1.1.0");
    source.tag("v1.1.0");
    source.publish();

    let outcome = switch_ref(&Git2Backend::new(), &path, "v1.1.0").unwrap();
    assert_eq!(outcome.ref_type, RefType::Tag);
    assert_eq!(outcome.new_commit, released);
}

#[test]
fn remote_only_branch_is_promoted_to_tracking_branch() {
    let source = PluginSource::with_manifest(UUID, "Promote", "1.0.0");
    source.branch("dev");
    source.checkout_branch("dev");
    source.write_file("dev.txt", "dev work");
    let dev_head = source.commit("Dev work");
    source.checkout_branch("main");
    source.publish();
    let (_dir, path) = clone(&source);

    let outcome = switch_ref(&Git2Backend::new(), &path, "dev").unwrap();

    assert_eq!(outcome.ref_type, RefType::Branch);
    assert_eq!(outcome.new_commit, dev_head);
    assert!(path.join("dev.txt").exists());
    let repo = Git2Backend::new().open(&path).unwrap();
    assert_eq!(repo.head_shorthand().unwrap(), "dev");
    assert_eq!(rev(&path, "refs/heads/dev"), dev_head);
}

#[test]
fn local_branch_fast_forwards_to_origin() {
    let source = PluginSource::with_manifest(UUID, "Forward", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);
    let before = rev(&path, "HEAD");

    source.write_manifest(UUID, "Forward", "1.1.0");
    let upstream = source.commit("Release 1.1.0");
    source.publish();

    let outcome = switch_ref(&Git2Backend::new(), &path, "main").unwrap();

    assert_eq!(outcome.old_commit, before);
    assert_eq!(outcome.new_commit, upstream);
    assert_eq!(rev(&path, "HEAD"), upstream);
}

#[test]
fn raw_commit_switch_reports_abbreviated_ref() {
    let source = PluginSource::with_manifest(UUID, "Pinned", "1.0.0");
    let first = source.head();
    source.write_file("later.txt", "later");
    source.commit("Later");
    source.publish();
    let (_dir, path) = clone(&source);

    let outcome = switch_ref(&Git2Backend::new(), &path, &first).unwrap();

    assert_eq!(outcome.ref_type, RefType::Commit);
    assert_eq!(outcome.new_ref, short_id(&first));
    assert_eq!(outcome.new_commit, first);
    assert!(head_is_detached(&path));
    assert!(!path.join("later.txt").exists());
}

#[test]
fn unknown_ref_is_not_found() {
    let source = PluginSource::with_manifest(UUID, "Missing", "1.0.0");
    source.publish();
    let (_dir, path) = clone(&source);

    let err = switch_ref(&Git2Backend::new(), &path, "no-such-ref").unwrap_err();
    match err {
        Error::RefNotFound { reference, hint } => {
            assert_eq!(reference, "no-such-ref");
            assert_eq!(hint, None);
        }
        other => panic!("expected RefNotFound, got {other:?}"),
    }
}

#[test]
fn relative_ref_on_remote_branch_suggests_origin_prefix() {
    let source = PluginSource::with_manifest(UUID, "Hint", "1.0.0");
    source.branch("dev");
    source.checkout_branch("dev");
    source.write_file("dev.txt", "dev");
    source.commit("Dev");
    source.checkout_branch("main");
    source.publish();
    let (_dir, path) = clone(&source);

    let err = switch_ref(&Git2Backend::new(), &path, "dev~1").unwrap_err();
    assert!(matches!(
        err,
        Error::RefNotFound { ref hint, .. } if hint.as_deref() == Some("origin/dev")
    ));
    assert!(err.to_string().contains("origin/dev"));
}

#[test]
fn local_repository_without_origin_can_switch() {
    let source = PluginSource::with_manifest(UUID, "Local", "1.0.0");
    source.tag("v1.0.0");
    source.write_file("next.txt", "next");
    source.commit("Next");

    let outcome = switch_ref(&Git2Backend::new(), &source.work_path(), "v1.0.0").unwrap();
    assert_eq!(outcome.ref_type, RefType::Tag);
}
