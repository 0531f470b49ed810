use abacus_proxy::config::config_search_paths;
use abacus_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "abacus-proxy",
    about = "OpenAI-compatible chat completions proxy for the Abacus chat backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Request log file path
    #[arg(long, default_value = "abacus-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "abacus_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        println!("  (none found: built-in defaults)");
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    // No overall request timeout: completions stream for as long as the
    // backend keeps sending. Stalls are bounded by the idle timeout instead.
    let client = reqwest::Client::builder()
        .connect_timeout(config.backend.connect_timeout())
        .build()?;

    let state = Arc::new(AppState::new(config.clone(), client, logger.clone())?);

    info!("abacus-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Conversation URL: {}", config.backend.create_conversation_url);
    info!("  Send URL:         {}", config.backend.send_message_url);
    info!("  Port:             {}", config.port);
    info!("  Model aliases:    {}", config.models.len());
    info!("  Idle timeout:     {:?}", config.backend.idle_timeout());
    info!("  Log file:         {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting abacus-proxy send_url={} port={}",
            config.backend.send_message_url, config.port
        ),
    );

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
