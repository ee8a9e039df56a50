//! Extension metadata record.
//!
//! # Responsibility
//! - Describe one independently packaged UI extension.
//! - Apply registration-time defaults (base path, view and style file names).
//! - Validate declaration-level invariants before persistence.
//!
//! # Invariants
//! - `tag` is globally unique and never empty.
//! - An extension never lists itself as a dependency.
//! - Records are serialized camelCase to match manifest JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Unique extension identifier; also its component name and cache key.
pub type Tag = String;

/// Default view template file name.
pub const DEFAULT_TEMPLATE_FILE: &str = "view.html";
/// Default style sheet file name.
pub const DEFAULT_STYLE_FILE: &str = "style.css";

/// One external resource reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// External css/js resources declared by an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css: Vec<Asset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub js: Vec<Asset>,
}

/// One supported language entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Language catalogue of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCatalogue {
    pub default: String,
    #[serde(default)]
    pub supported: BTreeMap<String, Language>,
}

/// Canonical extension metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionMetadata {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Origin classification, e.g. `local`, `git`, `marketplace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Source-relative location of the extension code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Deployment location; derived from `path` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_runtime_version: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub installed: bool,
    /// Internal extensions are not listed to end users.
    #[serde(default)]
    pub internal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<AssetGroup>,
    /// Tags loaded before this extension's own code, in no particular order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<LanguageCatalogue>,
}

fn default_enabled() -> bool {
    true
}

impl ExtensionMetadata {
    /// Creates a minimal enabled record with no code path.
    pub fn new(tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            version: None,
            description: None,
            author: None,
            icon: None,
            source: None,
            link: None,
            path: None,
            base_path: None,
            min_runtime_version: None,
            enabled: true,
            installed: false,
            internal: false,
            template: None,
            style: None,
            external: None,
            dependencies: Vec::new(),
            languages: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Fills registration defaults without overriding explicit values.
    ///
    /// - `base_path` falls back to `path`, then to `tag`.
    /// - `template` falls back to [`DEFAULT_TEMPLATE_FILE`].
    /// - `style` falls back to [`DEFAULT_STYLE_FILE`].
    pub fn with_defaults(mut self) -> Self {
        if self.base_path.is_none() {
            self.base_path = Some(self.effective_base_path().to_string());
        }
        self.template.get_or_insert_with(|| DEFAULT_TEMPLATE_FILE.to_string());
        self.style.get_or_insert_with(|| DEFAULT_STYLE_FILE.to_string());
        self
    }

    /// Code path when present and non-blank.
    pub fn code_path(&self) -> Option<&str> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    pub fn effective_base_path(&self) -> &str {
        self.base_path
            .as_deref()
            .or_else(|| self.code_path())
            .unwrap_or(self.tag.as_str())
    }

    pub fn template_file(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE_FILE)
    }

    /// Validates the invariants the runtime depends on.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.tag.trim().is_empty() {
            return Err(MetadataError::EmptyTag);
        }
        if self.dependencies.iter().any(|dep| dep == &self.tag) {
            return Err(MetadataError::SelfDependency(self.tag.clone()));
        }
        Ok(())
    }

    /// Whether `version` is absent or semver shaped (`1.2.3`, `1.2.3-beta.1+build`).
    pub fn has_semver_version(&self) -> bool {
        self.version
            .as_deref()
            .map_or(true, |version| is_semver(version.trim()))
    }
}

fn is_semver(value: &str) -> bool {
    let core = value.split_once('+').map_or(value, |(head, _)| head);
    let core = core.split_once('-').map_or(core, |(head, _)| head);
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Metadata validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    EmptyTag,
    SelfDependency(String),
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTag => write!(f, "extension tag must not be empty"),
            Self::SelfDependency(tag) => write!(f, "extension {tag} depends on itself"),
        }
    }
}

impl Error for MetadataError {}

#[cfg(test)]
mod tests {
    use super::{ExtensionMetadata, MetadataError, DEFAULT_STYLE_FILE, DEFAULT_TEMPLATE_FILE};

    #[test]
    fn defaults_derive_base_path_from_path() {
        let meta = ExtensionMetadata::new("ext-hello", "Hello")
            .with_path("hello")
            .with_defaults();
        assert_eq!(meta.base_path.as_deref(), Some("hello"));
        assert_eq!(meta.template.as_deref(), Some(DEFAULT_TEMPLATE_FILE));
        assert_eq!(meta.style.as_deref(), Some(DEFAULT_STYLE_FILE));
    }

    #[test]
    fn defaults_fall_back_to_tag_and_keep_explicit_values() {
        let mut meta = ExtensionMetadata::new("ext-hello", "Hello");
        meta.template = Some("custom.html".to_string());
        let meta = meta.with_defaults();
        assert_eq!(meta.base_path.as_deref(), Some("ext-hello"));
        assert_eq!(meta.template_file(), "custom.html");
    }

    #[test]
    fn blank_path_is_not_a_code_path() {
        let meta = ExtensionMetadata::new("ext-hello", "Hello").with_path("   ");
        assert_eq!(meta.code_path(), None);
    }

    #[test]
    fn deserializes_camel_case_manifest_record() {
        let meta: ExtensionMetadata = serde_json::from_str(
            r#"{
                "tag": "ext-hello",
                "name": "Hello",
                "version": "1.0.0",
                "path": "hello",
                "basePath": "extensions/hello",
                "dependencies": ["ext-base"],
                "external": { "css": [{ "path": "https://cdn.example/x.css" }] }
            }"#,
        )
        .unwrap();
        assert_eq!(meta.base_path.as_deref(), Some("extensions/hello"));
        assert_eq!(meta.dependencies, vec!["ext-base".to_string()]);
        assert!(meta.enabled);
        assert!(!meta.installed);
        assert_eq!(meta.external.unwrap().css.len(), 1);
    }

    #[test]
    fn name_is_optional_in_manifest_records() {
        let meta: ExtensionMetadata =
            serde_json::from_str(r#"{"tag":"a","version":"1.0.0","path":"a"}"#).unwrap();
        assert_eq!(meta.tag, "a");
        assert_eq!(meta.name, "");
    }

    #[test]
    fn validate_rejects_only_runtime_breaking_records() {
        assert_eq!(
            ExtensionMetadata::new(" ", "x").validate(),
            Err(MetadataError::EmptyTag)
        );
        assert!(matches!(
            ExtensionMetadata::new("ext-a", "x")
                .with_dependencies(["ext-a"])
                .validate(),
            Err(MetadataError::SelfDependency(_))
        ));
        assert!(ExtensionMetadata::new("MyWidget", "x")
            .with_version("1.0")
            .validate()
            .is_ok());
    }

    #[test]
    fn semver_check_accepts_prerelease_and_build_suffixes() {
        let with = |version: &str| ExtensionMetadata::new("ext-a", "x").with_version(version);
        assert!(with("1.2.3").has_semver_version());
        assert!(with("1.0.0-beta.1").has_semver_version());
        assert!(with("1.0.0+build.7").has_semver_version());
        assert!(!with("1.0").has_semver_version());
        assert!(!with("v1").has_semver_version());
        assert!(ExtensionMetadata::new("ext-a", "x").has_semver_version());
    }
}
