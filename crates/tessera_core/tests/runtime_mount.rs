use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tessera_core::{
    ComponentRegistry, ComponentView, DirFetcher, ExtensionMetadata, ImportError,
    MemoryExtensionStore, ModuleCatalog, RenderData, RenderError, RenderOutcome, RenderSurface,
    RenderTree, Runtime, RuntimeConfig, RuntimeError, TemplateError,
};

#[derive(Default)]
struct Surface {
    commits: Mutex<Vec<String>>,
}

impl Surface {
    fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }
}

impl RenderSurface for Surface {
    fn commit(&self, tree: RenderTree) {
        self.commits.lock().unwrap().push(tree.into_markup());
    }
}

#[derive(Default)]
struct Calls {
    inits: AtomicUsize,
    errors: AtomicUsize,
    fail: AtomicBool,
}

struct Greeter {
    greeting: String,
    calls: Arc<Calls>,
}

impl ComponentView for Greeter {
    fn data(&self) -> Result<RenderData, RenderError> {
        if self.calls.fail.load(Ordering::SeqCst) {
            return Err(RenderError::new("greeting service down"));
        }
        let mut data = RenderData::new();
        data.insert("greeting".into(), json!(self.greeting));
        Ok(data)
    }

    fn on_init(&self) {
        self.calls.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _err: &RenderError) -> Result<(), RenderError> {
        self.calls.errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn write(root: &Path, relative: &str, body: &str) {
    let file = root.join(relative);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, body).unwrap();
}

fn greeter_module(
    tag: &'static str,
    calls: Arc<Calls>,
) -> impl Fn(&ComponentRegistry) -> Result<(), ImportError> + Send + Sync + 'static {
    move |registry: &ComponentRegistry| -> Result<(), ImportError> {
        let calls = Arc::clone(&calls);
        registry.register_component(
            tag,
            ExtensionMetadata::new(tag, tag),
            move |meta: &ExtensionMetadata| -> Box<dyn ComponentView> {
                Box::new(Greeter {
                    greeting: format!("hello from {}", meta.name),
                    calls: Arc::clone(&calls),
                })
            },
        )?;
        Ok(())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    runtime: Runtime,
    calls: Arc<Calls>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "extensions-manifest.json",
        &json!([
            { "tag": "hello", "name": "Hello", "version": "1.0.0", "path": "hello" },
            { "tag": "other", "name": "Other", "version": "1.0.0", "path": "other" },
            { "tag": "no-view", "name": "No View", "version": "1.0.0", "path": "no-view" },
            { "tag": "silent", "name": "Silent", "version": "1.0.0", "path": "silent" },
            { "tag": "off", "name": "Off", "version": "1.0.0", "path": "off", "enabled": false }
        ])
        .to_string(),
    );
    write(root, "extensions/hello/view.html", "<h1>{{ greeting }}</h1>");
    write(root, "extensions/other/view.html", "<h2>{{ greeting }}</h2>");
    write(root, "extensions/silent/view.html", "<p></p>");

    let calls = Arc::new(Calls::default());
    let catalog = Arc::new(ModuleCatalog::new());
    catalog.register_module(
        "/extensions/hello/component.js",
        greeter_module("hello", Arc::clone(&calls)),
    );
    catalog.register_module(
        "/extensions/other/component.js",
        greeter_module("other", Arc::new(Calls::default())),
    );
    catalog.register_module(
        "/extensions/no-view/component.js",
        greeter_module("no-view", Arc::clone(&calls)),
    );
    catalog.register_module("/extensions/silent/component.js", |_: &ComponentRegistry| Ok(()));

    let runtime = Runtime::builder(RuntimeConfig::default(), Arc::new(DirFetcher::new(root)))
        .store(Arc::new(MemoryExtensionStore::new()))
        .code_loader(catalog)
        .build();
    runtime.init().await;

    Fixture {
        dir,
        runtime,
        calls,
    }
}

#[tokio::test]
async fn mount_loads_code_compiles_template_and_paints_on_next_frame() {
    let fx = fixture().await;
    let surface = Arc::new(Surface::default());

    let instance = fx
        .runtime
        .mount("hello", surface.clone())
        .await
        .unwrap()
        .expect("hello is registered");

    assert!(fx.runtime.is_loaded("hello"));
    assert!(instance.is_connected());
    assert_eq!(fx.calls.inits.load(Ordering::SeqCst), 1);
    assert!(surface.commits().is_empty());
    assert!(fx.runtime.templates().contains("/extensions/hello/view.html"));

    assert_eq!(fx.runtime.frames().pump(), 1);
    assert_eq!(surface.commits(), vec!["<h1>hello from Hello</h1>".to_string()]);
}

#[tokio::test]
async fn unknown_and_disabled_extensions_mount_nothing() {
    let fx = fixture().await;
    let surface = Arc::new(Surface::default());

    assert!(fx.runtime.mount("ghost", surface.clone()).await.unwrap().is_none());
    assert!(fx.runtime.mount("off", surface.clone()).await.unwrap().is_none());
    assert!(!fx.runtime.is_loaded("off"));
    assert_eq!(fx.runtime.frames().pending(), 0);
}

#[tokio::test]
async fn missing_template_fails_the_mount() {
    let fx = fixture().await;

    let err = fx
        .runtime
        .mount("no-view", Arc::new(Surface::default()))
        .await
        .err()
        .expect("mount without a view template must fail");

    assert!(matches!(
        err,
        RuntimeError::Template(TemplateError::NotFound { .. })
    ));
    assert!(fx.runtime.is_loaded("no-view"));
}

#[tokio::test]
async fn code_that_registers_nothing_is_reported() {
    let fx = fixture().await;

    let err = fx
        .runtime
        .mount("silent", Arc::new(Surface::default()))
        .await
        .err()
        .expect("mount without a component must fail");

    assert!(matches!(err, RuntimeError::ComponentNotRegistered(tag) if tag == "silent"));
}

#[tokio::test]
async fn failing_component_is_isolated_from_its_sibling() {
    let fx = fixture().await;
    let broken_surface = Arc::new(Surface::default());
    let healthy_surface = Arc::new(Surface::default());

    let broken = fx
        .runtime
        .mount("hello", broken_surface.clone())
        .await
        .unwrap()
        .unwrap();
    let healthy = fx
        .runtime
        .mount("other", healthy_surface.clone())
        .await
        .unwrap()
        .unwrap();
    fx.runtime.frames().pump();

    fx.calls.fail.store(true, Ordering::SeqCst);
    let broken_ticket = broken.refresh();
    let healthy_ticket = healthy.refresh();
    assert_eq!(fx.runtime.frames().pump(), 2);

    assert!(matches!(broken_ticket.await, RenderOutcome::Placeholder(_)));
    assert_eq!(healthy_ticket.await, RenderOutcome::Rendered);
    assert_eq!(fx.calls.errors.load(Ordering::SeqCst), 1);
    assert!(broken_surface.commits()[1].contains("greeting service down"));
    assert_eq!(
        healthy_surface.commits(),
        vec![
            "<h2>hello from Other</h2>".to_string(),
            "<h2>hello from Other</h2>".to_string()
        ]
    );
}

#[tokio::test]
async fn second_mount_reuses_loaded_code_and_cached_template() {
    let fx = fixture().await;

    fx.runtime
        .mount("hello", Arc::new(Surface::default()))
        .await
        .unwrap();
    fx.runtime
        .mount("hello", Arc::new(Surface::default()))
        .await
        .unwrap();

    assert_eq!(fx.runtime.templates().len(), 1);
    assert_eq!(fx.calls.inits.load(Ordering::SeqCst), 2);
    assert_eq!(fx.runtime.frames().pump(), 2);
}

#[tokio::test]
async fn host_registered_component_mounts_without_code() {
    let fx = fixture().await;
    write(fx.dir.path(), "extensions/inline/view.html", "<i>{{ greeting }}</i>");
    fx.runtime
        .save(ExtensionMetadata::new("inline", "Inline").with_version("1.0.0"))
        .await
        .unwrap();
    let calls = Arc::clone(&fx.calls);
    fx.runtime
        .components()
        .register_component(
            "inline",
            ExtensionMetadata::new("inline", "Inline"),
            move |_: &ExtensionMetadata| -> Box<dyn ComponentView> {
                Box::new(Greeter {
                    greeting: "inline".to_string(),
                    calls: Arc::clone(&calls),
                })
            },
        )
        .unwrap();
    let surface = Arc::new(Surface::default());

    let instance = fx
        .runtime
        .mount("inline", surface.clone())
        .await
        .unwrap()
        .expect("inline is registered");

    assert!(!fx.runtime.is_loaded("inline"));
    assert_eq!(instance.force_refresh(), RenderOutcome::Rendered);
    assert_eq!(surface.commits(), vec!["<i>inline</i>".to_string()]);
}

#[tokio::test]
async fn shutdown_releases_session_state() {
    let fx = fixture().await;
    fx.runtime
        .mount("hello", Arc::new(Surface::default()))
        .await
        .unwrap();

    fx.runtime.shutdown();

    assert!(fx.runtime.get_tags().is_empty());
    assert!(fx.runtime.templates().is_empty());
    assert!(!fx.runtime.components().is_registered("hello"));
}
