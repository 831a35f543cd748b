use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zonekeeper::config::ApiConfig;
use zonekeeper::http_server::HttpServer;
use zonekeeper::service::ZoneService;
use zonekeeper::store::FileStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP control plane for CoreDNS zone files", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve the API on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory holding the Corefile and zone files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.validate()?;

    let store = Arc::new(FileStore::open(&config.data_dir)?);
    info!("Serving zones from {}", store.root().display());

    let service = Arc::new(ZoneService::from_config(&config, store));

    if let Some(mode) = config.reconcile_on_startup {
        let startup = service.clone();
        let report = tokio::task::spawn_blocking(move || startup.reconcile(mode)).await??;
        if report.is_consistent() {
            info!("Corefile and zone files are consistent");
        } else if !report.repaired {
            warn!(
                "{} dangling registry entries and {} unserved zones, run POST {}/reconcile to repair",
                report.dangling_entries.len(),
                report.unserved_zones.len(),
                config.base_path
            );
        }
    }

    HttpServer::new(service, config.base_path.clone(), config.bind_addr)
        .start()
        .await
}
