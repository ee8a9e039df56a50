//! Manifest retrieval and registry reconciliation.
//!
//! # Responsibility
//! - Fetch and decode the declarative extension manifest.
//! - Reconcile it against the persistent registry as add/update operations.
//!
//! # Invariants
//! - First run (empty registry) seeds every decodable manifest record verbatim.
//! - A record that fails to decode is skipped on its own; only a body that is
//!   not a JSON array makes the manifest unavailable.
//! - Later runs insert unknown tags and fully overwrite records whose
//!   `version`, `path` or `name` differ; identical records are untouched.
//! - Local records absent from the manifest are retained, never deleted.
//! - Reconciliation is sequential, entry by entry, in manifest order.
//! - An unavailable manifest skips synchronization; it is not an error.

use crate::assets::{AssetFetcher, AssetPaths, FetchError};
use crate::model::extension::{ExtensionMetadata, Tag};
use crate::store::{ExtensionStore, StoreResult};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Manifest could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    NotFound(String),
    Fetch(FetchError),
    Parse(String),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "extension manifest not found: {path}"),
            Self::Fetch(err) => write!(f, "extension manifest unavailable: {err}"),
            Self::Parse(message) => write!(f, "extension manifest is not valid JSON: {message}"),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::NotFound(_) | Self::Parse(_) => None,
        }
    }
}

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Manifest was unavailable; registry left as-is.
    pub skipped: bool,
    /// Registry was empty and has been seeded.
    pub seeded: bool,
    pub added: Vec<Tag>,
    pub updated: Vec<Tag>,
    pub unchanged: Vec<Tag>,
    /// Local tags absent from the manifest; kept in the registry.
    pub retained: Vec<Tag>,
    /// Manifest entries that failed to decode or validate, or duplicated a tag.
    /// Undecodable entries are named by their `tag` field, else `#<index>`.
    pub invalid: Vec<Tag>,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty()
    }
}

/// Decoded manifest: usable records plus entries that failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub records: Vec<ExtensionMetadata>,
    pub rejected: Vec<Tag>,
}

/// Decodes manifest JSON (an array of metadata records), record by record.
pub fn parse_manifest(raw: &str) -> Result<Manifest, ManifestError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw).map_err(|err| ManifestError::Parse(err.to_string()))?;

    let mut manifest = Manifest::default();
    for (index, value) in values.into_iter().enumerate() {
        let label = value
            .get("tag")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("#{index}"), str::to_string);
        match serde_json::from_value::<ExtensionMetadata>(value) {
            Ok(record) => manifest.records.push(record),
            Err(err) => {
                warn!(
                    "event=manifest_entry module=manifest status=warn action=skip reason=decode entry={label} error={err}"
                );
                manifest.rejected.push(label);
            }
        }
    }
    Ok(manifest)
}

/// Fetches and decodes the manifest at `paths.manifest_path()`.
pub async fn fetch_manifest(
    fetcher: &dyn AssetFetcher,
    paths: &AssetPaths,
) -> Result<Manifest, ManifestError> {
    let path = paths.manifest_path();
    match fetcher.fetch_text(&path).await {
        Ok(Some(raw)) => parse_manifest(&raw),
        Ok(None) => Err(ManifestError::NotFound(path)),
        Err(err) => Err(ManifestError::Fetch(err)),
    }
}

/// Whether a stored record must be overwritten by its manifest counterpart.
pub fn needs_update(existing: &ExtensionMetadata, incoming: &ExtensionMetadata) -> bool {
    existing.version != incoming.version
        || existing.path != incoming.path
        || existing.name != incoming.name
}

/// Reconciles `manifest` into `store`.
pub async fn synchronize(
    store: &dyn ExtensionStore,
    manifest: &[ExtensionMetadata],
) -> StoreResult<SyncReport> {
    let mut report = SyncReport::default();
    let entries = accepted_entries(manifest, &mut report);

    if store.is_empty().await? {
        info!(
            "event=manifest_sync module=manifest status=start mode=seed entries={}",
            entries.len()
        );
        for entry in entries {
            store.save(entry).await?;
            report.added.push(entry.tag.clone());
        }
        report.seeded = true;
        info!(
            "event=manifest_sync module=manifest status=ok mode=seed added={}",
            report.added.len()
        );
        return Ok(report);
    }

    let current: BTreeMap<Tag, ExtensionMetadata> = store
        .list()
        .await?
        .into_iter()
        .map(|record| (record.tag.clone(), record))
        .collect();

    for entry in &entries {
        match current.get(&entry.tag) {
            None => {
                info!(
                    "event=manifest_sync module=manifest status=ok action=add tag={}",
                    entry.tag
                );
                store.save(entry).await?;
                report.added.push(entry.tag.clone());
            }
            Some(existing) if needs_update(existing, entry) => {
                info!(
                    "event=manifest_sync module=manifest status=ok action=update tag={} from_version={} to_version={}",
                    entry.tag,
                    existing.version.as_deref().unwrap_or("-"),
                    entry.version.as_deref().unwrap_or("-")
                );
                store.save(entry).await?;
                report.updated.push(entry.tag.clone());
            }
            Some(_) => report.unchanged.push(entry.tag.clone()),
        }
    }

    let manifest_tags: BTreeSet<&str> = entries.iter().map(|entry| entry.tag.as_str()).collect();
    report.retained = current
        .keys()
        .filter(|tag| !manifest_tags.contains(tag.as_str()))
        .cloned()
        .collect();
    if !report.retained.is_empty() {
        info!(
            "event=manifest_sync module=manifest status=ok action=retain tags={}",
            report.retained.join(",")
        );
    }

    Ok(report)
}

fn accepted_entries<'m>(
    manifest: &'m [ExtensionMetadata],
    report: &mut SyncReport,
) -> Vec<&'m ExtensionMetadata> {
    let mut seen = BTreeSet::new();
    let mut accepted = Vec::with_capacity(manifest.len());
    for entry in manifest {
        if let Err(err) = entry.validate() {
            warn!("event=manifest_entry module=manifest status=warn action=skip error={err}");
            report.invalid.push(entry.tag.clone());
            continue;
        }
        if !entry.has_semver_version() {
            warn!(
                "event=manifest_entry module=manifest status=warn reason=non_semver_version tag={} version={}",
                entry.tag,
                entry.version.as_deref().unwrap_or("-")
            );
        }
        if !seen.insert(entry.tag.as_str()) {
            warn!(
                "event=manifest_entry module=manifest status=warn action=skip reason=duplicate tag={}",
                entry.tag
            );
            report.invalid.push(entry.tag.clone());
            continue;
        }
        accepted.push(entry);
    }
    accepted
}

/// Fetch + reconcile pipeline bound to one registry.
pub struct ManifestSynchronizer {
    store: Arc<dyn ExtensionStore>,
    fetcher: Arc<dyn AssetFetcher>,
    paths: AssetPaths,
}

impl ManifestSynchronizer {
    pub fn new(
        store: Arc<dyn ExtensionStore>,
        fetcher: Arc<dyn AssetFetcher>,
        paths: AssetPaths,
    ) -> Self {
        Self {
            store,
            fetcher,
            paths,
        }
    }

    /// Fetches the manifest, or `None` (logged) when it is unavailable.
    pub async fn fetch(&self) -> Option<Manifest> {
        match fetch_manifest(self.fetcher.as_ref(), &self.paths).await {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!(
                    "event=manifest_fetch module=manifest status=warn error_code=manifest_unavailable error={err}"
                );
                None
            }
        }
    }

    /// Runs one synchronization pass.
    pub async fn run(&self) -> StoreResult<SyncReport> {
        match self.fetch().await {
            Some(manifest) => {
                let mut report = synchronize(self.store.as_ref(), &manifest.records).await?;
                let mut invalid = manifest.rejected;
                invalid.append(&mut report.invalid);
                report.invalid = invalid;
                Ok(report)
            }
            None => Ok(SyncReport::skipped()),
        }
    }
}
