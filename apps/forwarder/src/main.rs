use anyhow::Result;
use clap::Parser;
use hooktunnel::{Config, ReconnectConfig, TunnelClient};
use hooktunnel_common::{
    Capabilities, Environment, TunnelError,
    constants::{
        CONNECT_TIMEOUT_SECS, DEFAULT_LOCAL_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_INFLIGHT,
        DEFAULT_TUNNEL_URL, REQUEST_TIMEOUT_SECS,
    },
};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the tunnel agent
#[derive(Parser, Debug)]
#[command(name = "hooktunnel")]
#[command(about = "Forward HookTunnel webhooks to a service on this machine", long_about = None)]
#[command(version)]
struct Args {
    /// Gateway environment (dev, staging, prod)
    env: Environment,

    /// Local port to forward requests to
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Local host address
    #[arg(long, default_value = DEFAULT_LOCAL_HOST)]
    host: String,

    /// WebSocket tunnel endpoint
    #[arg(short, long, env = "HOOKTUNNEL_TUNNEL_URL", default_value = DEFAULT_TUNNEL_URL)]
    endpoint: String,

    /// API key presented to the gateway
    #[arg(short = 'k', long, env = "HOOKTUNNEL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Connection and handshake timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,

    /// Local request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Concurrent requests advertised to the gateway
    #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT)]
    max_inflight: u32,

    /// Largest request body advertised to the gateway, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: u64,

    /// Reconnect delays in seconds, one per attempt
    #[arg(long, value_delimiter = ',', default_value = "1,2,5,10,30")]
    reconnect_schedule: Vec<u64>,
}

fn config_from_args(args: &Args) -> Config {
    let mut config = Config::new(args.port);
    config.tunnel_url = args.endpoint.clone();
    config.api_key = args.api_key.clone().filter(|key| !key.trim().is_empty());
    config.env = args.env;
    config.local_host = args.host.clone();
    config.capabilities = Capabilities {
        max_inflight: args.max_inflight,
        max_body_bytes: args.max_body_bytes,
        supports_gzip: false,
    };
    config.connect_timeout = Duration::from_secs(args.connect_timeout);
    config.request_timeout = Duration::from_secs(args.request_timeout);
    config.reconnect = ReconnectConfig::new(
        args.reconnect_schedule
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect(),
    );
    config
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config: Config) -> std::result::Result<(), TunnelError> {
    if config.api_key.is_none() {
        return Err(TunnelError::AuthRequired);
    }

    info!("Environment: {}", config.env);
    info!("Local service: {}", config.local_base_url());
    info!("Tunnel endpoint: {}", config.tunnel_url);

    let client = TunnelClient::new(config)?;
    let session = client.connect().await?;

    info!("Connected to HookTunnel");
    info!("  Session: {}...", session.short_id());
    info!("  Forwarding to: {}", client.config().local_base_url());
    info!("Waiting for webhooks... (Ctrl+C to stop)");

    let outcome = tokio::select! {
        exit = client.wait_for_exit() => exit.into_error().map_or(Ok(()), Err),
        _ = shutdown_signal() => {
            info!("Disconnecting...");
            client.disconnect().await;
            Ok(())
        }
    };

    let activity = client.activity_log();
    info!(
        "Forwarded {} requests ({} failed)",
        activity.len(),
        activity.failures()
    );

    outcome
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("HookTunnel agent v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config_from_args(&args)).await {
        error!("{}", e);
        if let Some(suggestion) = e.suggestion() {
            error!("  {}", suggestion);
        }
        std::process::exit(1);
    }

    Ok(())
}
