use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracko_agents::{ChatAgent, StaticFallback};
use tracko_core::{ChatInput, NlpConfig, NlpEngine};
use tracko_observability::{init_tracing, AppMetrics};
use tracko_storage::{Store, DEFAULT_BUS_CAPACITY};

#[derive(Debug, Parser)]
#[command(name = "tracko")]
#[command(about = "Tracko bus assistant CLI")]
struct Cli {
    /// Alternative intent catalogue and lexicons (JSON).
    #[arg(long, global = true, env = "TRACKO_NLP_CONFIG")]
    nlp_config: Option<PathBuf>,

    /// SQLite url for live bus data; the bundled snapshot is used otherwise.
    #[arg(long, global = true, env = "TRACKO_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat with the assistant.
    Chat,
    Classify { message: String },
    Extract { message: String },
    Process { message: String },
    /// Print the active bus snapshot.
    Buses,
    Routes,
    /// Latest crowd report for one bus.
    Crowd { bus_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("tracko_cli");
    let cli = Cli::parse();

    let engine = Arc::new(load_engine(cli.nlp_config.as_ref())?);

    match cli.command {
        Command::Classify { message } => {
            println!("{}", serde_json::to_string_pretty(&engine.classify(&message))?);
        }
        Command::Extract { message } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&engine.extract_entities(&message))?
            );
        }
        Command::Process { message } => {
            println!("{}", serde_json::to_string_pretty(&engine.process(&message))?);
        }
        Command::Buses => {
            let agent = build_agent(engine, cli.database_url.as_deref()).await?;
            let buses = agent.active_buses().await?;
            println!("{}", serde_json::to_string_pretty(&buses)?);
        }
        Command::Routes => {
            let agent = build_agent(engine, cli.database_url.as_deref()).await?;
            let routes = agent.route_catalogue().await?;
            println!("{}", serde_json::to_string_pretty(&routes)?);
        }
        Command::Crowd { bus_id } => {
            let agent = build_agent(engine, cli.database_url.as_deref()).await?;
            match agent.crowd_status(&bus_id).await? {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => println!("no bus {bus_id} in the snapshot"),
            }
        }
        Command::Chat => {
            let agent = build_agent(engine, cli.database_url.as_deref()).await?;
            run_chat(agent).await?;
        }
    }

    Ok(())
}

async fn run_chat(agent: ChatAgent<Store>) -> Result<()> {
    println!("Tracko chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let reply = agent
            .handle_chat(ChatInput {
                message: message.to_string(),
                context: None,
            })
            .await?;

        println!("\n{}\n", reply.reply);
        if let Some(intent) = &reply.nlp.intent {
            println!("[{} {:.2}]\n", intent, reply.nlp.confidence);
        }
    }

    Ok(())
}

fn load_engine(path: Option<&PathBuf>) -> Result<NlpEngine> {
    let config = match path {
        Some(path) => NlpConfig::from_json_file(path)
            .with_context(|| format!("failed loading NLP catalogue from {}", path.display()))?,
        None => NlpConfig::default(),
    };
    Ok(NlpEngine::new(config))
}

async fn build_agent(engine: Arc<NlpEngine>, database_url: Option<&str>) -> Result<ChatAgent<Store>> {
    let store = match database_url {
        Some(database_url) => Store::sqlite(database_url, DEFAULT_BUS_CAPACITY).await?,
        None => Store::memory(DEFAULT_BUS_CAPACITY)?,
    };

    Ok(ChatAgent::new(
        engine,
        Arc::new(store),
        Arc::new(StaticFallback::default()),
        AppMetrics::shared(),
    ))
}
