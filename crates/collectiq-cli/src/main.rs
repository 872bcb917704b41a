use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use collectiq_agent::DialogueEngine;
use collectiq_core::config::{Config, LoggingConfig};
use collectiq_core::ports::PayerDirectory;
use collectiq_core::store::JsonFileStore;
use collectiq_core::types::{Action, ConversationState, PayerContext};
use collectiq_gateway::{CallServices, GatewayState};

#[derive(Parser)]
#[command(
    name = "collectiq",
    about = "Outbound collections voice agent: carrier gateway and dialogue simulator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the carrier gateway
    Serve {
        /// Port to listen on (default: 4004)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Talk to the dialogue engine from the terminal
    Simulate {
        /// Look the payer up in the configured store
        #[arg(long)]
        payer_id: Option<String>,

        /// Payer name, when not using the store
        #[arg(long)]
        name: Option<String>,

        /// Amount due
        #[arg(long)]
        amount: Option<f64>,

        /// ISO currency code for the amount
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Print each decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show gateway status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => serve(config, port).await?,
        Commands::Simulate {
            payer_id,
            name,
            amount,
            currency,
            date,
            json,
        } => {
            let payer = match payer_id {
                Some(id) => {
                    let store = JsonFileStore::new(config.storage_dir());
                    let payer = store.get_payer(&id).await?;
                    if payer.is_none() {
                        tracing::warn!(payer_id = %id, "Payer not found; using generic phrasing");
                    }
                    payer
                }
                None => name.map(|name| PayerContext {
                    id: "local".into(),
                    name,
                    amount_due: amount,
                    currency_code: Some(currency),
                    last_status: None,
                }),
            };
            simulate(&config, payer, date, json).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s)", errors.len());
                }
                if warnings.is_empty() {
                    println!("Config OK");
                }
            }
        },
        Commands::Status => {
            println!("CollectIQ v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Storage: {}", config.storage_dir().display());
            println!("Gateway port: {}", config.gateway_port());

            let url = format!("http://127.0.0.1:{}/health", config.gateway_port());
            match reqwest::get(&url).await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("Status: running");
                    println!("Active calls: {}", body["active_calls"]);
                    println!("Total calls: {}", body["total_calls"]);
                }
                _ => println!("Status: not running"),
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then the config file's level.
fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let logging = logging.cloned().unwrap_or_default();
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };

    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    for directive in &logging.filters {
        match directive.parse::<tracing_subscriber::filter::Directive>() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring invalid log filter '{directive}': {e}"),
        }
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid config: {}", errors.join("; "));
    }

    let port = port.unwrap_or_else(|| config.gateway_port());
    let services = CallServices::from_config(&config)?;

    #[allow(unused_mut)]
    let mut state = GatewayState::new(config, services);
    #[cfg(feature = "metrics")]
    {
        state.metrics_handle = Some(collectiq_gateway::metrics::install_prometheus_recorder()?);
    }

    tracing::info!("Starting CollectIQ gateway on port {port}");
    collectiq_gateway::start_gateway(Arc::new(state), port).await
}

async fn simulate(
    config: &Config,
    payer: Option<PayerContext>,
    date: Option<NaiveDate>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = DialogueEngine::new(config.agent_name(), config.follow_up_horizon_days())?;
    let today = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut state = ConversationState::default();

    println!("Agent: {}", engine.greeting(payer.as_ref()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let decision = engine.decide(state, line, payer.as_ref(), today);
        if json {
            println!("{}", serde_json::to_string(&decision)?);
        } else {
            println!("Agent: {}", decision.response);
            match &decision.action {
                Action::None => {}
                Action::FollowUp { date, reason } => println!("  [follow-up {date}: {reason}]"),
                action => println!("  [{}]", action.kind()),
            }
        }

        state = decision.next_state;
        if state.is_terminal() {
            break;
        }
    }

    Ok(())
}
