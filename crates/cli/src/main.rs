mod connection_commands;
mod extension_commands;
mod message_commands;
mod run_command;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parabox", about = "Parabox: one inbox for many chat backends")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/parabox/).
    #[arg(long, global = true, env = "PARABOX_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "PARABOX_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured connection (default when no subcommand is provided).
    Run,
    /// Extension discovery.
    Extensions {
        #[command(subcommand)]
        action: extension_commands::ExtensionAction,
    },
    /// Persisted connections.
    Connections {
        #[command(subcommand)]
        action: connection_commands::ConnectionAction,
    },
    /// Stored messages.
    Messages {
        #[command(subcommand)]
        action: message_commands::MessageAction,
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    // Apply directory overrides before loading config.
    if let Some(ref dir) = cli.config_dir {
        parabox_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        parabox_config::set_data_dir(dir.clone());
    }
    let config = parabox_config::discover_and_load();

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "parabox starting");
            run_command::run(config).await
        },
        Some(Commands::Extensions { action }) => {
            extension_commands::handle_extensions(action, &config).await
        },
        Some(Commands::Connections { action }) => {
            connection_commands::handle_connections(action, &config).await
        },
        Some(Commands::Messages { action }) => {
            message_commands::handle_messages(action, &config).await
        },
    }
}
