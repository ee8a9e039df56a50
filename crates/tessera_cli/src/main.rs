//! Command-line host for the Tessera extension runtime.
//!
//! # Responsibility
//! - Run manifest synchronization against a local document root or origin.
//! - Inspect the registry, preview-load and preview-render single extensions.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::{
    default_log_level, init_logging, AssetFetcher, CodeLoader, ComponentRegistry, ComponentView,
    DirFetcher, ExtensionMetadata, HttpFetcher, ImportError, RenderData, RenderError,
    RenderOutcome, RenderSurface, RenderTree, Runtime, RuntimeConfig,
};

/// Tessera - micro-frontend extension runtime
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about = "Tessera extension runtime host")]
struct Args {
    /// Runtime config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serve assets from this directory
    #[arg(long, global = true, conflicts_with = "origin")]
    root: Option<PathBuf>,

    /// Serve assets from this HTTP origin, e.g. https://host
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Write rolling logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the manifest into the registry and print the outcome
    Sync,

    /// Print registry records as JSON
    List {
        /// Include internal extensions
        #[arg(long)]
        all: bool,
    },

    /// Load one extension and its dependencies in preview mode
    Load { tag: String },

    /// Mount one extension with static data and print its first render
    Render {
        tag: String,

        /// Render data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    if let Some(dir) = args.log_dir.as_ref().or(config.log.dir.as_ref()) {
        let level = config.log.level.as_deref().unwrap_or(default_log_level());
        init_logging(level, dir)?;
    }

    let fetcher: Arc<dyn AssetFetcher> = match (&args.root, &args.origin) {
        (_, Some(origin)) => Arc::new(HttpFetcher::new(origin.clone())),
        (Some(root), None) => Arc::new(DirFetcher::new(root.clone())),
        (None, None) => Arc::new(DirFetcher::new(std::env::current_dir()?)),
    };

    match args.command {
        Command::Sync => {
            let runtime = Runtime::builder(config, fetcher).build();
            let report = runtime.init().await;
            if report.skipped {
                println!("manifest unavailable; registry left as-is");
            }
            print_tags("added", &report.added);
            print_tags("updated", &report.updated);
            print_tags("unchanged", &report.unchanged);
            print_tags("retained", &report.retained);
            print_tags("invalid", &report.invalid);
        }
        Command::List { all } => {
            let runtime = Runtime::builder(config, fetcher).build();
            runtime.init().await;
            let records: Vec<ExtensionMetadata> = runtime
                .list()
                .await?
                .into_iter()
                .filter(|record| all || !record.internal)
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Load { tag } => {
            let runtime = Runtime::builder(config, fetcher)
                .code_loader(Arc::new(PreviewLoader {
                    data: RenderData::new(),
                }))
                .build();
            runtime.init().await;

            let Some(metadata) = runtime.get(&tag) else {
                return Err(format!("extension {tag} is not registered").into());
            };
            runtime.loader().load_dependencies(&metadata).await?;
            runtime.load(&tag).await?;
            println!("{tag}: loaded={}", runtime.is_loaded(&tag));
            for dep in &metadata.dependencies {
                println!("  {dep}: loaded={}", runtime.is_loaded(dep));
            }
        }
        Command::Render { tag, data } => {
            let data: RenderData = serde_json::from_str(&data)?;
            let runtime = Runtime::builder(config, fetcher)
                .code_loader(Arc::new(PreviewLoader { data }))
                .build();
            runtime.init().await;

            let Some(instance) = runtime.mount(&tag, Arc::new(StdoutSurface)).await? else {
                return Err(format!("extension {tag} is unknown or disabled").into());
            };
            if let RenderOutcome::Failed(err) = instance.force_refresh() {
                return Err(err.into());
            }
            info!("event=cli_render module=cli status=ok tag={tag}");
        }
    }
    Ok(())
}

fn print_tags(label: &str, tags: &[String]) {
    if !tags.is_empty() {
        println!("{label}: {}", tags.join(", "));
    }
}

/// Stands in for extension code: every import registers a static view.
struct PreviewLoader {
    data: RenderData,
}

#[async_trait]
impl CodeLoader for PreviewLoader {
    async fn import(
        &self,
        tag: &str,
        _entry: &str,
        registry: &ComponentRegistry,
    ) -> Result<(), ImportError> {
        if registry.is_registered(tag) {
            return Ok(());
        }
        let data = self.data.clone();
        registry.register_component(
            tag,
            ExtensionMetadata::new(tag, tag),
            move |_: &ExtensionMetadata| -> Box<dyn ComponentView> {
                Box::new(StaticView { data: data.clone() })
            },
        )?;
        Ok(())
    }
}

struct StaticView {
    data: RenderData,
}

impl ComponentView for StaticView {
    fn data(&self) -> Result<RenderData, RenderError> {
        Ok(self.data.clone())
    }
}

struct StdoutSurface;

impl RenderSurface for StdoutSurface {
    fn commit(&self, tree: RenderTree) {
        println!("{}", tree.markup());
    }
}
