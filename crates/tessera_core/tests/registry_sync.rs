use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tessera_core::{
    AssetFetcher, ExtensionMetadata, ExtensionStore, FetchError, MemoryExtensionStore, Runtime,
    RuntimeConfig, SqliteExtensionStore,
};

const MANIFEST_PATH: &str = "/extensions-manifest.json";

#[derive(Default)]
struct MapFetcher {
    files: Mutex<HashMap<String, String>>,
}

impl MapFetcher {
    fn with_manifest(records: &[ExtensionMetadata]) -> Arc<Self> {
        let fetcher = Arc::new(Self::default());
        fetcher.put(MANIFEST_PATH, &serde_json::to_string(records).unwrap());
        fetcher
    }

    fn put(&self, path: &str, body: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }
}

#[async_trait]
impl AssetFetcher for MapFetcher {
    async fn fetch_text(&self, path: &str) -> Result<Option<String>, FetchError> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }
}

fn ext(tag: &str, version: &str) -> ExtensionMetadata {
    ExtensionMetadata::new(tag, tag)
        .with_version(version)
        .with_path(tag)
}

fn runtime(store: Arc<dyn ExtensionStore>, fetcher: Arc<MapFetcher>) -> Runtime {
    Runtime::builder(RuntimeConfig::default(), fetcher)
        .store(store)
        .build()
}

#[tokio::test]
async fn empty_registry_is_seeded_from_manifest() {
    let store = Arc::new(SqliteExtensionStore::in_memory());
    let runtime = runtime(store.clone(), MapFetcher::with_manifest(&[ext("a", "1.0.0")]));

    let report = runtime.init().await;

    assert!(report.seeded);
    assert_eq!(report.added, vec!["a".to_string()]);
    let listed = runtime.list().await.unwrap();
    assert_eq!(listed, vec![ext("a", "1.0.0")]);
    assert_eq!(runtime.get_tags(), vec!["a".to_string()]);
    assert!(!runtime.is_loaded("a"));
    assert_eq!(
        runtime.get("a").unwrap().base_path.as_deref(),
        Some("a"),
        "directory entries carry registration defaults"
    );
}

#[tokio::test]
async fn seed_accepts_manifest_records_without_name() {
    let fetcher = Arc::new(MapFetcher::default());
    fetcher.put(MANIFEST_PATH, r#"[{"tag":"a","version":"1.0.0","path":"a"}]"#);
    let runtime = runtime(Arc::new(SqliteExtensionStore::in_memory()), fetcher);

    let report = runtime.init().await;

    assert!(!report.skipped);
    assert!(report.seeded);
    let listed = runtime.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].tag, "a");
    assert!(!runtime.is_loaded("a"));
}

#[tokio::test]
async fn one_malformed_record_does_not_block_the_rest() {
    let fetcher = Arc::new(MapFetcher::default());
    fetcher.put(
        MANIFEST_PATH,
        r#"[{"tag":"a","name":"A","version":"1.0.0","path":"a"},{"tag":"b","version":["1"]}]"#,
    );
    let runtime = runtime(Arc::new(MemoryExtensionStore::new()), fetcher);

    let report = runtime.init().await;

    assert!(!report.skipped);
    assert_eq!(report.added, vec!["a".to_string()]);
    assert_eq!(report.invalid, vec!["b".to_string()]);
    assert!(runtime.get("a").is_some());
    assert!(runtime.get("b").is_none());
}

#[tokio::test]
async fn seed_keeps_prerelease_versions_and_mixed_case_tags() {
    let fetcher = Arc::new(MapFetcher::default());
    fetcher.put(
        MANIFEST_PATH,
        r#"[{"tag":"ext-a","version":"1.0.0-beta.1"},{"tag":"MyWidget","version":"1.0"}]"#,
    );
    let runtime = runtime(Arc::new(MemoryExtensionStore::new()), fetcher);

    let report = runtime.init().await;

    assert!(report.invalid.is_empty());
    assert_eq!(runtime.list().await.unwrap().len(), 2);
    assert!(runtime.get("MyWidget").is_some());
}

#[tokio::test]
async fn changed_version_overwrites_whole_record() {
    let mut local = ext("a", "1.0.0");
    local.enabled = false;
    let store = Arc::new(MemoryExtensionStore::with_records([local]));
    let runtime = runtime(store.clone(), MapFetcher::with_manifest(&[ext("a", "1.1.0")]));

    let report = runtime.init().await;

    assert!(!report.seeded);
    assert_eq!(report.updated, vec!["a".to_string()]);
    let stored = store.get("a").await.unwrap().unwrap();
    assert_eq!(stored, ext("a", "1.1.0"));
    assert!(stored.enabled);
}

#[tokio::test]
async fn unchanged_records_keep_local_fields_and_unknown_tags_are_added() {
    let mut local = ext("a", "1.0.0");
    local.enabled = false;
    let store = Arc::new(MemoryExtensionStore::with_records([local.clone()]));
    let runtime = runtime(
        store.clone(),
        MapFetcher::with_manifest(&[ext("a", "1.0.0"), ext("b", "0.1.0")]),
    );

    let report = runtime.init().await;

    assert_eq!(report.unchanged, vec!["a".to_string()]);
    assert_eq!(report.added, vec!["b".to_string()]);
    assert_eq!(store.get("a").await.unwrap(), Some(local));
    assert_eq!(store.get("b").await.unwrap(), Some(ext("b", "0.1.0")));
}

#[tokio::test]
async fn local_records_missing_from_manifest_are_retained() {
    let orphan = ext("orphan", "2.0.0");
    let store = Arc::new(MemoryExtensionStore::with_records([
        ext("a", "1.0.0"),
        orphan.clone(),
    ]));
    let runtime = runtime(store.clone(), MapFetcher::with_manifest(&[ext("a", "1.0.0")]));

    let report = runtime.init().await;

    assert_eq!(report.retained, vec!["orphan".to_string()]);
    assert_eq!(store.get("orphan").await.unwrap(), Some(orphan));
    assert!(runtime.get("orphan").is_some());
}

#[tokio::test]
async fn missing_manifest_skips_sync_and_uses_registry_as_is() {
    let store = Arc::new(MemoryExtensionStore::with_records([ext("a", "1.0.0")]));
    let runtime = runtime(store, Arc::new(MapFetcher::default()));

    let report = runtime.init().await;

    assert!(report.skipped);
    assert_eq!(runtime.get_tags(), vec!["a".to_string()]);
}

#[tokio::test]
async fn malformed_manifest_skips_sync() {
    let fetcher = Arc::new(MapFetcher::default());
    fetcher.put(MANIFEST_PATH, "{ not json");
    let runtime = runtime(Arc::new(MemoryExtensionStore::new()), fetcher);

    let report = runtime.init().await;

    assert!(report.skipped);
    assert!(runtime.get_tags().is_empty());
}

#[tokio::test]
async fn unavailable_storage_falls_back_to_memory_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteExtensionStore::open_file(
        dir.path().join("missing/nested/registry.db"),
    ));
    let runtime = runtime(store, MapFetcher::with_manifest(&[ext("a", "1.0.0")]));

    let report = runtime.init().await;

    assert!(report.seeded);
    assert_eq!(runtime.get_tags(), vec!["a".to_string()]);
    assert_eq!(runtime.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn registry_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("registry.db");
    let fetcher = MapFetcher::with_manifest(&[ext("a", "1.0.0")]);

    let first = runtime(
        Arc::new(SqliteExtensionStore::open_file(&db_path)),
        fetcher.clone(),
    );
    first.init().await;
    first.disable("a").await.unwrap();

    let second = runtime(Arc::new(SqliteExtensionStore::open_file(&db_path)), fetcher);
    let report = second.init().await;

    assert!(!report.seeded);
    assert_eq!(report.unchanged, vec!["a".to_string()]);
    assert!(!second.get("a").unwrap().enabled);
}

#[tokio::test]
async fn management_operations_keep_registry_and_directory_aligned() {
    let store = Arc::new(MemoryExtensionStore::new());
    let fetcher = MapFetcher::with_manifest(&[ext("a", "1.0.0"), ext("b", "1.0.0")]);
    let runtime = runtime(store.clone(), fetcher.clone());
    runtime.init().await;

    runtime.save(ext("c", "0.0.1")).await.unwrap();
    assert!(runtime.get("c").is_some());
    assert!(store.get("c").await.unwrap().is_some());
    assert!(runtime.save(ext(" ", "1.0.0")).await.is_err());

    runtime.remove("b").await.unwrap();
    assert!(runtime.get("b").is_none());
    assert!(store.get("b").await.unwrap().is_none());

    assert!(!runtime.disable("nope").await.unwrap());

    fetcher.put(
        MANIFEST_PATH,
        &serde_json::to_string(&[ext("a", "2.0.0"), ext("b", "1.0.0")]).unwrap(),
    );
    assert_eq!(runtime.reload_manifest().await.unwrap(), 2);
    assert_eq!(
        runtime.get("a").unwrap().version.as_deref(),
        Some("2.0.0")
    );
    assert!(runtime.get("b").is_some());

    runtime.reset().await.unwrap();
    assert!(runtime.get_tags().is_empty());
    assert!(store.is_empty().await.unwrap());
}
