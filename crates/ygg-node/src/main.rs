use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use ygg_consensus::{LocalRouter, RaftOptions};
use ygg_engine::RaftKvEngine;
use ygg_meta::{StoreMetaManager, StoreServerMeta};
use ygg_server::messages::AddRegionRequest;
use ygg_server::StoreServices;
use ygg_storage::{node_partitions, FjallEngine, MemEngine, RawEngine};
use ygg_types::{is_reserved_cf, Location, Peer, Range, Region, RegionId};

#[derive(clap::Parser, Debug)]
#[command(name = "ygg-node", about = "Yggdrasil replicated region store node")]
struct Cli {
    #[arg(long)]
    store_id: u64,
    #[arg(long, default_value = "127.0.0.1:20001")]
    server_addr: String,
    #[arg(long, default_value = "127.0.0.1:20101")]
    raft_addr: String,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `storage.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Overrides `storage.engine`.
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,
    /// Creates a single-replica region over the whole key space when this
    /// store does not host it yet.
    #[arg(long)]
    bootstrap_region: Option<RegionId>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EngineKind {
    Fjall,
    Memory,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    engine: EngineKind,
    data_dir: PathBuf,
    data_partitions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    request_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    storage: StorageConfig,
    raft: RaftOptions,
    server: ServerConfig,
    observability: ObservabilityConfig,
}

fn parse_location(addr: &str) -> anyhow::Result<Location> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("address '{addr}' is not host:port"))?;
    let port = port.parse().with_context(|| format!("invalid port in '{addr}'"))?;
    Ok(Location::new(host, port))
}

fn open_engine(
    kind: EngineKind,
    data_dir: &Path,
    extra: &[String],
) -> anyhow::Result<Arc<dyn RawEngine>> {
    if let Some(cf) = extra.iter().find(|cf| is_reserved_cf(cf)) {
        anyhow::bail!("data partition '{cf}' uses a reserved name");
    }
    let partitions = node_partitions(extra);
    let engine: Arc<dyn RawEngine> = match kind {
        EngineKind::Fjall => FjallEngine::open(data_dir, &partitions)
            .with_context(|| format!("failed to open fjall at {}", data_dir.display()))?,
        EngineKind::Memory => Arc::new(MemEngine::new(&partitions)),
    };
    Ok(engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let config: Config = figment
        .merge(Env::prefixed("YGGDRASIL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    let server_location = parse_location(&cli.server_addr)?;
    let raft_location = parse_location(&cli.raft_addr)?;
    let engine_kind = cli.engine.unwrap_or(config.storage.engine);
    let data_dir = cli.data_dir.unwrap_or(config.storage.data_dir);

    tracing::info!(
        store_id = cli.store_id,
        server_addr = %server_location,
        raft_addr = %raft_location,
        engine = ?engine_kind,
        data_dir = %data_dir.display(),
        "node starting"
    );

    let raw = open_engine(engine_kind, &data_dir, &config.storage.data_partitions)?;
    let server_meta =
        StoreServerMeta::new(cli.store_id, server_location.clone(), raft_location.clone());
    let meta = Arc::new(
        StoreMetaManager::new(raw.clone(), server_meta).context("failed to open meta store")?,
    );
    meta.init().context("failed to initialize store identity")?;
    meta.recover().context("failed to recover region meta")?;

    let router = Arc::new(LocalRouter::new());
    let engine = Arc::new(RaftKvEngine::new(raw, meta.clone(), router, config.raft));
    let recovered = engine.recover().await;

    let services = StoreServices::new(
        engine.clone(),
        meta.clone(),
        Duration::from_millis(config.server.request_timeout_ms),
    );

    if let Some(region_id) = cli.bootstrap_region {
        if !meta.is_exist_region(region_id) {
            let peer = Peer::new(cli.store_id, server_location, raft_location);
            let region = Region::new(region_id, vec![peer], Range::full());
            let resp = services.region.add_region(AddRegionRequest { region }).await;
            if let Some(err) = resp.error {
                anyhow::bail!("bootstrap of region {region_id} failed: {}", err.errmsg);
            }
        }
    }

    tracing::info!(
        store_id = cli.store_id,
        recovered,
        regions = ?engine.region_ids(),
        "node ready"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    engine.shutdown().await;
    Ok(())
}
