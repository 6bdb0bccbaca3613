//! Standalone fixed-target reverse proxy.
//!
//! ```text
//! sentinel-proxy --target http://127.0.0.1:3000 --port 8080
//! sentinel-proxy --config proxy.toml -v
//! ```
//!
//! CLI flags override the config file. Ctrl+C drains in-flight requests and exits.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use sentinel_proxy::config::loader::{load_config, validate_loaded};
use sentinel_proxy::observability::{logging, metrics};
use sentinel_proxy::{ProxyConfig, ReverseProxy, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "sentinel-proxy", version, about = "Fixed-target reverse proxy with attack detection")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream URL every request is forwarded to.
    #[arg(short, long)]
    target: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Rewrite the outbound Host header to the target's host.
    #[arg(long)]
    change_origin: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(target) = &self.target {
            config.target = Some(target.clone());
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if self.change_origin {
            config.change_origin = true;
        }
        match (self.quiet, self.verbose) {
            (true, _) => config.observability.log_level = "warn".to_string(),
            (false, 0) => {}
            (false, 1) => config.observability.log_level = "debug".to_string(),
            (false, _) => config.observability.log_level = "trace".to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    validate_loaded(&config)?;

    logging::init_logging(&config.observability.log_level)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        target_url = config.target.as_deref().unwrap_or_default(),
        change_origin = config.change_origin,
        detectors = config.attack_detectors.len(),
        upstream_timeout_ms = config.timeouts.upstream_ms,
        "sentinel-proxy starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let proxy = ReverseProxy::from_config(&config)?;
    let listener = TcpListener::bind(config.listener.socket_address()).await?;

    let shutdown = Shutdown::new();
    let mut server = tokio::spawn(proxy.serve(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server => result??,
        result = shutdown.trigger_on_ctrl_c() => {
            result?;
            server.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
