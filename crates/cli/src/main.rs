mod check_commands;
mod segment_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    courier_config::CourierConfig,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: support-channel auto-reply gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/courier/).
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook gateway (default when no subcommand is provided).
    Serve,
    /// Validate the configuration and report problems.
    Check,
    /// Print the delivery plan for a markdown reply.
    Segment {
        /// Markdown file; reads stdin when omitted.
        file: Option<PathBuf>,
        /// Character limit per text part (defaults to the configured limit).
        #[arg(long)]
        limit: Option<usize>,
        /// Keep authoring markdown instead of channel markup.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load config from `--config` or the standard locations, then apply
/// `COURIER_*` env overrides and finally CLI flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<CourierConfig> {
    let config = match &cli.config {
        Some(path) => courier_config::load_config(path)?,
        None => courier_config::discover_and_load(),
    };
    let mut config = courier_config::apply_env_overrides(config);
    if let Some(bind) = &cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = resolve_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "courier starting");
            let result = courier_config::validate(&config);
            for d in &result.diagnostics {
                warn!(path = d.path, severity = %d.severity, "{}", d.message);
            }
            if result.has_errors() {
                anyhow::bail!("invalid configuration, run `courier check` for details");
            }
            courier_gateway::server::start_gateway(config).await
        },
        Some(Commands::Check) => check_commands::handle_check(&config, cli.config.as_deref()),
        Some(Commands::Segment { file, limit, raw }) => {
            segment_commands::handle_segment(&config, file.as_deref(), limit, raw)
        },
    }
}
