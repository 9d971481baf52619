// ABOUTME: Entry point for the muster binary.
// ABOUTME: Parses CLI arguments, initializes tracing, builds the swarm, and runs one request.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use muster_core::{Vars, WorkbenchConfig};
use muster_store::SqliteMemory;
use muster_swarm::{SwarmBuilder, SwarmError, UserRequest, parse_selector};

#[derive(Parser, Debug)]
#[command(name = "muster", version, about = "Command-line AI workbench")]
struct Cli {
    /// Path to the workbench configuration file.
    #[arg(long, default_value = "muster.yaml")]
    config: PathBuf,

    /// Agent to use when the query carries no @selector.
    #[arg(long, default_value = "ask")]
    agent: String,

    /// Conversation id; requests sharing it share memory.
    #[arg(long, default_value = "")]
    chat_id: String,

    /// Directory holding the conversation database.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output format: text or json.
    #[arg(long, default_value = "text")]
    format: String,

    /// Override the configured turn budget.
    #[arg(long)]
    max_turns: Option<usize>,

    /// Override the configured wall-clock budget, in seconds.
    #[arg(long)]
    max_time: Option<u64>,

    /// The request, optionally starting with @agent.
    query: Vec<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::debug!(stage = err.stage(), "run failed");
        eprintln!("✗ {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), SwarmError> {
    let input = cli.query.join(" ");
    let (selector, query) = parse_selector(&input);
    if query.is_empty() {
        return Err(SwarmError::UserInput("empty query".to_string()));
    }
    let agent = selector.unwrap_or(cli.agent);

    let mut config = WorkbenchConfig::from_path(&cli.config)?;
    if let Some(max_turns) = cli.max_turns {
        config.max_turns = max_turns;
    }
    if let Some(max_time) = cli.max_time {
        config.max_time = max_time;
    }

    let data_dir = cli.data_dir.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| SwarmError::Config(format!("cannot create data dir: {e}")))?;
    let memory = SqliteMemory::open(&data_dir.join("chats.db"))?;

    let swarm = SwarmBuilder::new(config)
        .with_memory(Arc::new(memory))
        .build()?;

    let mut vars = Vars::new();
    let request = UserRequest::new(agent, query).with_chat_id(cli.chat_id);
    let response = swarm.run(&mut vars, request).await?;

    match cli.format.as_str() {
        "json" => {
            let out = serde_json::json!({
                "state": response.outcome.state,
                "mime_type": response.outcome.mime_type,
                "value": response.outcome.value,
            });
            println!("{out:#}");
        }
        _ => println!("{}", response.outcome.value),
    }
    Ok(())
}
