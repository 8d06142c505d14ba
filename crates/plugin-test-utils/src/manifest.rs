//! Manifest and registry document builders

/// A minimal valid `MANIFEST.toml` body.
pub fn manifest_toml(uuid: &str, name: &str, version: &str) -> String {
    format!(
        r#"uuid = "{uuid}"
name = "{name}"
version = "{version}"
description = "Test plugin {name}"
api = ["3.0"]
authors = ["Test Author"]
license = "GPL-2.0-or-later"
"#
    )
}

/// A registry document with the given plugin and blacklist entries.
///
/// Entries are raw JSON object literals, e.g.
/// `r#"{"id": "demo", "uuid": "...", "git_url": "..."}"#`.
pub fn registry_json(plugins: &[&str], blacklist: &[&str]) -> String {
    format!(
        r#"{{"api_version": "3.0", "plugins": [{}], "blacklist": [{}]}}"#,
        plugins.join(", "),
        blacklist.join(", ")
    )
}
