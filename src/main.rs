//! Virtual Startup CLI
//!
//! Command-line client for the Virtual Startup dashboard backend:
//! - List agents and stats
//! - Send commands to agents
//! - Tail live events
//! - Chat with an agent over the live channel

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vstartup::config::{generate_default_config, Config};
use vstartup::dashboard::{AgentKind, ChatSession, MessageSender, SendRejected};
use vstartup::live::{events, ConnectionManager, ConnectionState, LiveBinding, LiveOptions, SocketIoConnector};
use vstartup::ApiClient;

#[derive(Parser)]
#[command(name = "vstartup")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator console for the Virtual Startup agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: platform config dir, then ./vstartup.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// REST API base URL, overrides the config file
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Event server URL, overrides the config file
    #[arg(long, global = true)]
    pub socket_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all agents
    Agents,

    /// Show backend health and event channel reachability
    Status,

    /// Show the system overview
    Stats,

    /// Send a command to an agent by role (driver, creator, generator)
    Send {
        /// Agent kind; a leading slash is accepted (`/driver`)
        kind: String,
        /// Message text
        message: Vec<String>,
    },

    /// Print live events as they arrive
    Watch {
        /// Event names (default: activity, status, stats and workflow updates)
        events: Vec<String>,
    },

    /// Chat with an agent; each stdin line is sent as a message
    Chat {
        agent_id: i64,
        /// Number of history messages to load
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &cli.socket_url {
        config.live.socket_url = Some(url.clone());
    }

    init_logging(&config);

    match cli.command {
        Commands::Agents => {
            let api = api_client(&config)?;
            let agents = api.list_agents().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else if agents.is_empty() {
                println!("No agents registered.");
            } else {
                println!("{:<5} {:<20} {:<10} {:<20} {}", "ID", "Name", "Kind", "Role", "Status");
                println!("{}", "-".repeat(70));
                for agent in agents {
                    println!(
                        "{:<5} {:<20} {:<10} {:<20} {}",
                        agent.id, agent.name, agent.kind, agent.role, agent.status
                    );
                }
            }
        }

        Commands::Status => {
            let api = api_client(&config)?;

            match api.health().await {
                Ok(health) => {
                    println!("Virtual Startup v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!("API: {} ({})", health.status, config.api.base_url);
                    if let Some(message) = health.message {
                        println!("     {}", message);
                    }
                }
                Err(e) => {
                    eprintln!("Cannot reach the API at {}", config.api.base_url);
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }

            let manager = connection_manager(&config);
            let reachable = wait_for_connection(&manager, Duration::from_secs(5)).await;
            manager.disconnect();
            println!(
                "Events: {} ({})",
                if reachable { "connected" } else { "unreachable" },
                manager.url()
            );
        }

        Commands::Stats => {
            let api = api_client(&config)?;
            let overview = api.overview().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                println!("System: {}", overview.status);
                println!();
                println!(
                    "Agents:    {} total, {} active, {} idle",
                    overview.agents.total, overview.agents.active, overview.agents.idle
                );
                println!(
                    "Workflows: {} total, {} active, {} completed",
                    overview.workflows.total, overview.workflows.active, overview.workflows.completed
                );
                if let Some(failed) = overview.workflows.failed {
                    println!("           {} failed", failed);
                }
            }
        }

        Commands::Send { kind, message } => {
            let kind: AgentKind = kind.parse().map_err(anyhow::Error::msg)?;
            let message = message.join(" ");
            if message.trim().is_empty() {
                bail!("message is empty");
            }

            let api = api_client(&config)?;
            let agents = api.list_agents().await?;
            let agent = agents
                .into_iter()
                .find(|a| a.kind == kind)
                .with_context(|| format!("no {} agent registered", kind))?;

            let stored = api.send_agent_message(agent.id, message.trim()).await?;
            println!("Sent to {} (#{}): {}", agent.name, agent.id, stored.content);
        }

        Commands::Watch { events: names } => {
            let names = if names.is_empty() {
                vec![
                    events::ACTIVITY_LOG.to_string(),
                    events::AGENT_STATUS.to_string(),
                    events::STATS_UPDATE.to_string(),
                    events::WORKFLOW_UPDATE.to_string(),
                ]
            } else {
                names
            };

            let manager = connection_manager(&config);
            let _states = manager.on_connection_change(|state| {
                eprintln!("[{}]", state);
            });

            let json = cli.format == "json";
            let mut bindings = Vec::with_capacity(names.len());
            for name in names {
                let binding =
                    LiveBinding::activate(&manager, LiveOptions::<Option<Value>>::new(&name, None));
                let mut rx = binding.subscribe();
                tokio::spawn(async move {
                    while rx.changed().await.is_ok() {
                        let payload = rx.borrow_and_update().clone();
                        if let Some(payload) = payload {
                            print_event(&name, &payload, json);
                        }
                    }
                });
                bindings.push(binding);
            }

            tokio::signal::ctrl_c().await?;
            for binding in &bindings {
                binding.deactivate();
            }
            manager.disconnect();
        }

        Commands::Chat { agent_id, limit } => {
            let api = api_client(&config)?;
            let agent = api.get_agent(agent_id).await?;
            let history = api.agent_messages(agent_id, Some(limit)).await?;

            let manager = connection_manager(&config);
            let session = ChatSession::activate(&manager, agent_id);
            session.load_history(history);

            println!("Chatting with {} ({}). Ctrl-D to quit.", agent.name, agent.role);
            for message in session.messages() {
                println!("{:>8}: {}", format!("{:?}", message.sender).to_lowercase(), message.content);
            }

            let mut rx = session.subscribe();
            let mut printed = session.messages().len();
            let agent_name = agent.name.clone();
            let printer = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = rx.borrow_and_update().clone();
                    for message in state.messages.iter().skip(printed) {
                        if message.sender != MessageSender::Operator {
                            println!("{:>8}: {}", agent_name, message.content);
                        }
                    }
                    printed = state.messages.len();
                    if let Some(error) = &state.error {
                        eprintln!("error: {}", error);
                    }
                }
            });

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Some(line) = line? else { break };
                        match session.send(&line) {
                            Ok(()) | Err(SendRejected::EmptyMessage) => {}
                            Err(SendRejected::NotConnected) => {
                                eprintln!("Not connected yet; message not sent");
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            printer.abort();
            manager.disconnect();
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vstartup={}", config.logging.level).into());

    // Logs go to stderr so command output stays pipeable
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    ApiClient::new(&config.api.base_url, config.api.request_timeout())
        .context("building HTTP client")
}

fn connection_manager(config: &Config) -> ConnectionManager {
    ConnectionManager::new(
        config.socket_url(),
        Arc::new(SocketIoConnector::new()),
        config.live.reconnect_policy(),
    )
}

/// Connect and wait until the channel is up or `timeout` passes
async fn wait_for_connection(manager: &ConnectionManager, timeout: Duration) -> bool {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _observer = manager.on_connection_change(move |state| {
        let _ = tx.send(state);
    });
    manager.connect();

    tokio::time::timeout(timeout, async {
        while let Some(state) = rx.recv().await {
            if state == ConnectionState::Connected {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false)
}

fn print_event(name: &str, payload: &Value, json: bool) {
    if json {
        let line = serde_json::json!({ "event": name, "data": payload });
        println!("{}", line);
        return;
    }

    let time = chrono::Local::now().format("%H:%M:%S");
    match name {
        events::ACTIVITY_LOG => println!(
            "{} [{}] {}",
            time,
            payload["type"].as_str().unwrap_or("info"),
            payload["message"].as_str().unwrap_or("-")
        ),
        events::AGENT_STATUS => println!(
            "{} agent #{} is {}",
            time,
            payload["agent_id"],
            payload["status"].as_str().unwrap_or("unknown")
        ),
        _ => println!("{} {}: {}", time, name, payload),
    }
}
