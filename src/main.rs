use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use orderbot::board::Board;
use orderbot::config::{LoggingConfig, OrderbotConfig};
use orderbot::dispatch::Dispatcher;
use orderbot::runtime::{self, RuntimeHandle};
use orderbot::script::{self, Step};

#[derive(Parser)]
#[command(
    name = "orderbot",
    about = "Order dispatch for a service counter: VIP priority, resizable bot pool",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML); defaults to $ORDERBOT_CONFIG, then ./orderbot.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Processing time per order in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    processing_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a counter script on a simulated clock and print the board
    Replay {
        /// Steps: normal, vip, +bot, -bot, tick, wait:<ms>, show, quit
        /// (put `--` before the steps when the script uses -bot)
        #[arg(required = true)]
        script: Vec<String>,

        /// Print the final state as JSON instead of the board
        #[arg(long)]
        json: bool,
    },

    /// Run the counter in real time, reading steps from stdin
    Run,

    /// Print the effective configuration
    Config,
}

/// Stderr logging for the config lookup, before the configured subscriber exists.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(), || {
        OrderbotConfig::resolve(cli.config.as_deref())
    })?;
    if let Some(ms) = cli.processing_ms {
        config.dispatch.processing_ms = ms;
        config.validate()?;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Replay { script, json } => {
            let steps = script::parse_script(&script.join(" "))?;
            tracing::info!(steps = steps.len(), "Replaying counter script");
            let mut dispatcher = Dispatcher::from_config(&config.dispatch);
            let shown = script::replay(&mut dispatcher, &steps)?;

            if json {
                let snapshot = dispatcher.snapshot();
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                let boards: Vec<String> = shown.iter().map(|s| Board(s).to_string()).collect();
                print!("{}", boards.join("\n"));
            }
        }
        Commands::Run => {
            tracing::info!(
                processing_ms = config.dispatch.processing_ms,
                "Starting live counter"
            );
            run_live(Dispatcher::from_config(&config.dispatch)).await?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn run_live(dispatcher: Dispatcher) -> Result<()> {
    let handle = runtime::spawn(dispatcher);
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Steps: normal | vip | +bot | -bot | show | quit");
    print!("{}", Board(&updates.borrow_and_update()));

    let mut running = true;
    while running {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let tokens = line
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty());
                for token in tokens {
                    match script::parse_step(token) {
                        Ok(step) => {
                            if !apply_live_step(&handle, step).await? {
                                running = false;
                                break;
                            }
                        }
                        Err(e) => eprintln!("{e}"),
                    }
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print!("{}", Board(&updates.borrow_and_update()));
            }
        }
    }

    let last = handle.shutdown().await?;
    println!();
    print!("{}", Board(&last));
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn apply_live_step(handle: &RuntimeHandle, step: Step) -> Result<bool> {
    match step {
        Step::Submit(priority) => {
            handle.submit_order(priority).await?;
        }
        Step::AddBot => {
            handle.add_worker().await?;
        }
        Step::RemoveBot => {
            if handle.remove_worker().await?.is_none() {
                println!("No bots to remove.");
            }
        }
        Step::Show => {
            println!();
            print!("{}", Board(&handle.snapshot().await?));
        }
        Step::Tick | Step::Wait(_) => {
            println!("tick and wait only apply to replay; the live clock runs on its own.");
        }
        Step::Quit => return Ok(false),
    }
    Ok(true)
}
