//! Plugin manifest parsing and validation
//!
//! Every plugin carries a `MANIFEST.toml` at its root. The file is parsed
//! into a raw TOML table first so that type errors can be reported field by
//! field, and only a manifest that validates cleanly becomes a [`Manifest`].
//!
//! ```toml
//! uuid = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Example Plugin"
//! version = "1.0.0"
//! description = "Does one thing well"
//! api = ["3.0"]
//! authors = ["Jane Doe"]
//! license = "GPL-2.0-or-later"
//!
//! [name_i18n]
//! de = "Beispiel-Plugin"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::{Error, Result};

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "MANIFEST.toml";

const REQUIRED_FIELDS: &[&str] = &["uuid", "name", "description", "api"];
const OPTIONAL_STRING_FIELDS: &[&str] = &["license", "license_url", "homepage", "min_python_version"];
const I18N_SECTIONS: &[&str] = &["name_i18n", "description_i18n", "long_description_i18n"];

const NAME_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 200;
const LONG_DESCRIPTION_MAX: usize = 2000;
/// Leading spaces beyond which list nesting is considered abusive (nine levels).
const MAX_INDENT: usize = 36;

static API_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").unwrap());
static LOCALE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{2}(_[A-Z]{2})?$").unwrap());
static DANGEROUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(script|iframe|object|embed|style|form)\b|javascript:").unwrap()
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*/?\s*[a-zA-Z][a-zA-Z0-9]*(\s[^>]*)?/?>").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`]*`").unwrap());

/// A validated plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub uuid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    /// Host API versions the plugin was written against.
    pub api: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_python_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_locale: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub name_i18n: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description_i18n: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub long_description_i18n: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse and validate manifest text. `source` names the plugin
    /// directory in error messages.
    pub fn parse(content: &str, source: &Path) -> Result<Self> {
        let table: Table = toml::from_str(content).map_err(|e| Error::manifest_read(source, e))?;

        let errors = validate_manifest(&table);
        if !errors.is_empty() {
            return Err(Error::ManifestInvalid { errors });
        }

        Value::Table(table)
            .try_into()
            .map_err(|e| Error::manifest_read(source, e))
    }

    /// Read `MANIFEST.toml` from a plugin directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::ManifestNotFound {
                path: dir.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| Error::manifest_read(dir, e))?;
        Self::parse(&content, dir)
    }

    /// Name for `locale`, falling back from `pt_BR` to `pt` to the
    /// untranslated name.
    pub fn localized_name(&self, locale: &str) -> &str {
        lookup_i18n(&self.name_i18n, locale).unwrap_or(&self.name)
    }

    pub fn localized_description(&self, locale: &str) -> &str {
        lookup_i18n(&self.description_i18n, locale).unwrap_or(&self.description)
    }

    /// API versions both the plugin and the host support.
    pub fn compatible_api_versions(&self, supported: &[String]) -> Vec<String> {
        self.api
            .iter()
            .filter(|v| supported.contains(v))
            .cloned()
            .collect()
    }

    pub fn is_compatible(&self, supported: &[String]) -> bool {
        !self.compatible_api_versions(supported).is_empty()
    }

    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

fn lookup_i18n<'a>(map: &'a BTreeMap<String, String>, locale: &str) -> Option<&'a str> {
    if let Some(value) = map.get(locale) {
        return Some(value.as_str());
    }
    let language = locale.split(['_', '-']).next()?;
    map.get(language).map(String::as_str)
}

/// Validate a raw manifest table, returning every problem found.
///
/// An empty vector means the manifest is valid. Unknown categories and
/// unknown keys are accepted.
pub fn validate_manifest(table: &Table) -> Vec<String> {
    let mut errors = Vec::new();

    for field in REQUIRED_FIELDS {
        match table.get(*field) {
            None => errors.push(format!("Missing required field: {field}")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push(format!("Missing required field: {field}"))
            }
            _ => {}
        }
    }

    match table.get("uuid") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let is_v4 = uuid::Uuid::parse_str(s).is_ok_and(|u| u.get_version_num() == 4);
            if !is_v4 {
                errors.push(format!("Field 'uuid' must be a valid UUID v4, got '{s}'"));
            }
        }
        Some(Value::String(_)) | None => {}
        Some(_) => errors.push("Field 'uuid' must be a string".to_string()),
    }

    check_bounded_string(table, "name", NAME_MAX, &mut errors);
    check_bounded_string(table, "description", DESCRIPTION_MAX, &mut errors);

    if let Some(value) = table.get("version")
        && !value.is_str()
    {
        errors.push("Field 'version' must be a string".to_string());
    }

    match table.get("api") {
        Some(Value::Array(versions)) if versions.is_empty() => {
            errors.push("Field 'api' must list at least one version".to_string())
        }
        Some(Value::Array(versions)) => {
            for version in versions {
                match version.as_str() {
                    Some(v) if API_VERSION.is_match(v) => {}
                    Some(v) => errors.push(format!("Invalid API version: '{v}'")),
                    None => errors.push(format!("Invalid API version: {version}")),
                }
            }
        }
        Some(_) => errors.push("Field 'api' must be an array".to_string()),
        None => {}
    }

    check_string_list(table, "authors", "author", &mut errors);
    check_string_list(table, "maintainers", "maintainer", &mut errors);
    check_string_list(table, "categories", "category", &mut errors);

    for field in OPTIONAL_STRING_FIELDS {
        check_optional_string(table, field, &mut errors);
    }

    if check_optional_string(table, "source_locale", &mut errors)
        && let Some(locale) = table.get("source_locale").and_then(Value::as_str)
        && !LOCALE.is_match(locale)
    {
        errors.push(format!(
            "Field 'source_locale' must be a locale code like 'en' or 'pt_BR', got '{locale}'"
        ));
    }

    match table.get("long_description") {
        Some(Value::String(text)) => {
            if text.chars().count() > LONG_DESCRIPTION_MAX {
                errors.push(format!(
                    "Field 'long_description' must be max {LONG_DESCRIPTION_MAX} characters"
                ));
            }
            errors.extend(check_markdown("long_description", text));
        }
        Some(_) => errors.push("Field 'long_description' must be a string".to_string()),
        None => {}
    }

    for section in I18N_SECTIONS {
        check_i18n_section(table, section, &mut errors);
    }

    errors
}

fn check_bounded_string(table: &Table, field: &str, max: usize, errors: &mut Vec<String>) {
    match table.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() && s.chars().count() > max => {
            errors.push(format!("Field '{field}' must be 1-{max} characters"))
        }
        Some(Value::String(_)) | None => {}
        Some(_) => errors.push(format!("Field '{field}' must be a string")),
    }
}

fn check_string_list(table: &Table, field: &str, item: &str, errors: &mut Vec<String>) {
    match table.get(field) {
        Some(Value::Array(items)) if items.is_empty() => errors.push(format!(
            "Field '{field}' must contain at least one {item} if present"
        )),
        Some(Value::Array(items)) => {
            if items.iter().any(|v| v.as_str().is_none_or(|s| s.trim().is_empty())) {
                errors.push(format!("Field '{field}' must contain only non-empty strings"));
            }
        }
        Some(_) => errors.push(format!("Field '{field}' must be an array")),
        None => {}
    }
}

/// Returns true when the field is absent or a non-empty string.
fn check_optional_string(table: &Table, field: &str, errors: &mut Vec<String>) -> bool {
    match table.get(field) {
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(format!("Field '{field}' must not be empty"));
            false
        }
        Some(Value::String(_)) | None => true,
        Some(_) => {
            errors.push(format!("Field '{field}' must be a string"));
            false
        }
    }
}

fn check_i18n_section(table: &Table, section: &str, errors: &mut Vec<String>) {
    let entries = match table.get(section) {
        None => return,
        Some(Value::Table(entries)) => entries,
        Some(_) => {
            errors.push(format!("Section '{section}' must be a table"));
            return;
        }
    };
    if entries.is_empty() {
        errors.push(format!("Section '{section}' is present but empty"));
        return;
    }

    for (locale, value) in entries {
        let label = format!("{section}.{locale}");
        let Some(text) = value.as_str() else {
            errors.push(format!("Field '{label}' must be a string"));
            continue;
        };
        match section {
            "name_i18n" if text.trim().is_empty() || text.chars().count() > NAME_MAX => {
                errors.push(format!("Field '{label}' must be 1-{NAME_MAX} characters"))
            }
            "description_i18n"
                if text.trim().is_empty() || text.chars().count() > DESCRIPTION_MAX =>
            {
                errors.push(format!("Field '{label}' must be 1-{DESCRIPTION_MAX} characters"))
            }
            "long_description_i18n" => {
                if text.chars().count() > LONG_DESCRIPTION_MAX {
                    errors.push(format!(
                        "Field '{label}' must be max {LONG_DESCRIPTION_MAX} characters"
                    ));
                }
                errors.extend(check_markdown(&label, text));
            }
            _ => {}
        }
    }
}

/// Long descriptions are rendered as markdown by the host; raw HTML and
/// pathological nesting are rejected. Code spans and fenced blocks are
/// exempt.
fn check_markdown(label: &str, text: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut in_fence = false;
    let mut prose = String::new();
    let mut too_deep = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let indent: usize = line
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum();
        if indent >= MAX_INDENT && !line.trim().is_empty() {
            too_deep = true;
        }
        prose.push_str(&INLINE_CODE.replace_all(line, ""));
        prose.push('\n');
    }

    if DANGEROUS.is_match(&prose) {
        errors.push(format!("Field '{label}' contains dangerous content"));
    } else if HTML_TAG.is_match(&prose) {
        errors.push(format!("Field '{label}' contains HTML tags; use markdown instead"));
    }
    if too_deep {
        errors.push(format!("Field '{label}' has excessive list nesting"));
    }
    errors
}

/// Starter `MANIFEST.toml` for a new plugin.
pub fn manifest_template(uuid: &str) -> String {
    format!(
        r#"uuid = "{uuid}"
name = "My Plugin"
version = "0.1.0"
description = "Short description of what the plugin does"
api = ["3.0"]
authors = ["Your Name"]
license = "GPL-2.0-or-later"
license_url = "https://www.gnu.org/licenses/gpl-2.0.html"
# homepage = "https://example.com/my-plugin"
# categories = ["metadata"]
# long_description = """
# Longer **markdown** description.
# """

# [name_i18n]
# de = "Mein Plugin"
"#
    )
}
