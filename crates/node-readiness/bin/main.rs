use clap::Parser;
use node_readiness::{
    metrics::install_prometheus_recorder, HealthEvaluator, NodeClient, Overrides, ReadinessServer,
    Settings,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "node-readiness")]
#[command(about = "Readiness probe for execution layer nodes", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to ./config.yaml when present)
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// JSON-RPC URL of the node
    #[arg(long, env = "ETH_URL")]
    eth_url: Option<String>,

    /// Maximum age of the latest block in seconds
    #[arg(long, env = "MAX_SECONDS_BEHIND")]
    max_seconds_behind: Option<u64>,

    /// Minimum number of connected peers
    #[arg(long, env = "MIN_PEERS")]
    min_peers: Option<u64>,

    /// Address the readiness server binds to
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Timeout for every request sent to the node, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Evaluate in the background every N seconds instead of on each request
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Node name for metrics labels (defaults to the host of eth-url)
    #[arg(long, env = "NODENAME")]
    nodename: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            eth_url: self.eth_url.clone(),
            max_seconds_behind: self.max_seconds_behind,
            min_peers: self.min_peers,
            listen_addr: self.listen_addr.clone(),
            request_timeout_secs: self.request_timeout_secs,
            poll_interval_secs: self.poll_interval_secs,
            nodename: self.nodename.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref(), cli.overrides())?;

    let endpoint = settings.endpoint()?;
    let listen_addr = settings.listen_addr()?;

    // Local nodes carry no useful label
    let nodename = settings.nodename.clone().or_else(|| {
        endpoint
            .host_str()
            .filter(|host| *host != "localhost" && *host != "127.0.0.1")
            .map(str::to_string)
    });

    tracing::info!(
        "Starting readiness probe for {} (max {}s behind, min {} peers, {:?}) with nodename {:?}",
        endpoint,
        settings.max_seconds_behind,
        settings.min_peers,
        settings.mode(),
        nodename,
    );

    let node = NodeClient::new(endpoint, settings.request_timeout())?;
    let evaluator = HealthEvaluator::new(node, settings.thresholds());

    let prometheus_handle = install_prometheus_recorder()?;
    let server = ReadinessServer::new(evaluator, settings.mode(), nodename)
        .with_prometheus(prometheus_handle);

    server.serve(listen_addr).await?;

    Ok(())
}
