//! Base-path aware resource paths.
//!
//! Deployments may live under a sub-directory (`/my-app/`). Every absolute
//! runtime path is prefixed with that base; external URLs and relative paths
//! pass through untouched.

use crate::model::extension::ExtensionMetadata;

const EXTERNAL_PREFIXES: &[&str] = &["http://", "https://", "//", "mailto:", "tel:"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPaths {
    /// Normalized base without trailing slash; empty for root.
    base: String,
    manifest_file: String,
}

impl AssetPaths {
    pub fn new(base_path: &str, manifest_file: &str) -> Self {
        Self {
            base: normalize_base_path(base_path),
            manifest_file: manifest_file.trim_start_matches('/').to_string(),
        }
    }

    /// Root deployment with the default manifest file name.
    pub fn root() -> Self {
        Self::new("/", crate::config::DEFAULT_MANIFEST_FILE)
    }

    /// Normalized base path; empty string for root.
    pub fn base_path(&self) -> &str {
        &self.base
    }

    pub fn resolve(&self, path: &str) -> String {
        if is_external_url(path) || !path.starts_with('/') {
            return path.to_string();
        }
        format!("{}{path}", self.base)
    }

    /// Resolved path plus origin, e.g. `https://host/app/x`.
    pub fn full_url(&self, origin: &str, path: &str) -> String {
        let resolved = self.resolve(path);
        if is_external_url(&resolved) {
            return resolved;
        }
        format!("{}{resolved}", origin.trim_end_matches('/'))
    }

    pub fn manifest_path(&self) -> String {
        self.resolve(&format!("/{}", self.manifest_file))
    }

    /// Location of the code entry for an extension `path`.
    pub fn component_path(&self, code_path: &str) -> String {
        self.resolve(&format!("/extensions/{}/component.js", trim_slashes(code_path)))
    }

    pub fn template_path(&self, meta: &ExtensionMetadata) -> String {
        self.resolve(&format!(
            "/extensions/{}/{}",
            trim_slashes(meta.effective_base_path()),
            meta.template_file()
        ))
    }

    /// Extension-local JSON resource, e.g. `/extensions/hello/resources/data.json`.
    pub fn resource_path(&self, meta: &ExtensionMetadata, file: &str) -> Option<String> {
        meta.code_path().map(|path| {
            self.resolve(&format!("/extensions/{}/resources/{file}", trim_slashes(path)))
        })
    }

    pub fn asset_url(&self, meta: &ExtensionMetadata, file: &str) -> Option<String> {
        meta.code_path().map(|path| {
            self.resolve(&format!("/extensions/{}/assets/{file}", trim_slashes(path)))
        })
    }
}

pub fn is_external_url(path: &str) -> bool {
    EXTERNAL_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    if normalized == "/" {
        String::new()
    } else {
        normalized
    }
}

fn trim_slashes(value: &str) -> &str {
    value.trim_matches('/')
}
