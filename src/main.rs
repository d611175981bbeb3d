use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use verdance::{
    cache::ReferenceCache,
    config::ConfigLoader,
    engine::SimulatorBuilder,
    rng::SeededRolls,
    scheduler::{CatchUpScheduler, Services},
    session::SessionRegistry,
    species::{CatalogFile, CatalogLoader},
    store::JsonDirStore,
    web::{self, AppState, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Verdance plant simulation service")]
struct Cli {
    /// Path to the service config YAML
    #[arg(long, default_value = "config/verdance.yaml")]
    config: PathBuf,

    /// Path to the species and fertilizer catalog YAML
    #[arg(long, default_value = "catalog/species.yaml")]
    catalog: PathBuf,

    /// Override the data directory from the config
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single catch-up pass and exit
    #[arg(long, conflicts_with = "serve")]
    once: bool,

    /// Start the HTTP surface and live sessions alongside the scheduler
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(".").load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // fail fast on a broken catalog; lookups re-read it through the cache
    let catalog = CatalogLoader::new(".").load(&cli.catalog)?;
    info!(
        species = catalog.species.len(),
        fertilizers = catalog.fertilizers.len(),
        "reference catalog loaded"
    );

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_dir.clone());
    let store = Arc::new(
        JsonDirStore::open(&data_dir)
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
    );
    let cache = Arc::new(ReferenceCache::new(
        Arc::new(CatalogFile::new(".", &cli.catalog)),
        Duration::from_secs(config.reference.refresh_secs),
    ));
    let simulator = Arc::new(
        SimulatorBuilder::new(config.tuning.clone())
            .with_rolls(Arc::new(SeededRolls::new(config.seed)))
            .with_max_disease_checks(config.scheduler.max_disease_checks_per_pass)
            .with_standard_pipeline()
            .build(),
    );
    let services = Services {
        plants: store.clone(),
        users: store.clone(),
        weather: store,
        cache,
        simulator,
    };
    let scheduler = Arc::new(CatchUpScheduler::new(
        services.clone(),
        config.scheduler.clone(),
    ));

    if cli.once {
        let report = scheduler.run_pass(Utc::now()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("could not listen for ctrl-c");
            return;
        }
        info!("shutting down");
        let _ = stop_tx.send(true);
    });

    let scheduler_task = tokio::spawn(scheduler.clone().run(stopped(stop_rx.clone())));

    if cli.serve {
        let registry = Arc::new(SessionRegistry::new(
            services,
            config.session.clone(),
            config.scheduler.idle_threshold_secs,
            config.scheduler.batch_size,
        ));
        let sessions_task = tokio::spawn(registry.clone().run(stopped(stop_rx.clone())));
        let state = AppState {
            registry,
            scheduler,
        };
        web::serve(
            state,
            WebServerConfig {
                host: cli.host.clone(),
                port: cli.port,
            },
            stopped(stop_rx),
        )
        .await?;
        sessions_task.await.context("session task failed")??;
    }

    scheduler_task.await.context("scheduler task failed")?;
    Ok(())
}

fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
