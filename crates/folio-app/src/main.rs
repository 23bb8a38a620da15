//! Folio application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite session store
//! 4. Pick the language model backend (OpenAI-compatible API or offline heuristic)
//! 5. Run the requested command against the agent facade

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use folio_agent::{Agent, AgentError, HeuristicLlm, LlmClient, OpenAiClient};
use folio_core::{FolioConfig, FolioError, LlmProvider};
use folio_storage::{Database, SqliteSessionStore};

use cli::{CliArgs, Command, SessionsCommand};

/// Load the config file, falling back to defaults. The error, if any, is
/// returned so it can be logged once tracing is up.
fn load_config(path: &Path) -> (FolioConfig, Option<FolioError>) {
    if !path.exists() {
        return (FolioConfig::default(), None);
    }
    match FolioConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (FolioConfig::default(), Some(e)),
    }
}

fn build_llm(offline: bool, config: &FolioConfig) -> Arc<dyn LlmClient> {
    if offline || config.llm.provider == LlmProvider::Heuristic {
        tracing::info!("Using offline heuristic model");
        return Arc::new(HeuristicLlm::new());
    }
    match OpenAiClient::from_env(&config.llm) {
        Ok(client) => {
            tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "Using OpenAI-compatible model");
            Arc::new(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remote model unavailable, falling back to offline heuristic model");
            Arc::new(HeuristicLlm::new())
        }
    }
}

async fn run_chat(agent: &Agent, session: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut session_id = session;
    if let Some(ref id) = session_id {
        match agent.get_session(id) {
            Ok(state) => println!("Resuming session {} ({} messages).", id, state.messages.len()),
            Err(AgentError::SessionNotFound(_)) => println!("Starting session {}.", id),
            Err(e) => return Err(e.into()),
        }
    }
    println!("Tell me what you like to read. Type /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/session" => {
                println!("{}", session_id.as_deref().unwrap_or("(no session yet)"));
                continue;
            }
            _ => {}
        }

        match agent.handle_turn(session_id.as_deref(), line).await {
            Ok(outcome) => {
                println!("{}\n", outcome.reply);
                session_id = Some(outcome.session_id);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    if let Some(id) = session_id {
        println!("Session saved as {}.", id);
    }
    Ok(())
}

fn run_sessions(agent: &Agent, action: SessionsCommand) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionsCommand::List => {
            let sessions = agent.list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions.");
            }
            for s in sessions {
                println!(
                    "{}  updated {}  {} messages  {} recommendations  last: {}",
                    s.session_id,
                    s.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    s.message_count,
                    s.recommendation_count,
                    s.last_action.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        SessionsCommand::Show { id } => {
            let state = agent.get_session(&id)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        SessionsCommand::Delete { id } => {
            if agent.delete_session(&id)? {
                println!("Deleted {}.", id);
            } else {
                println!("No session {}.", id);
            }
        }
        SessionsCommand::Stats => {
            let stats = agent.stats()?;
            println!("sessions:        {}", stats.total_sessions);
            println!("messages:        {}", stats.total_messages);
            println!("recommendations: {}", stats.total_recommendations);
        }
        SessionsCommand::Purge => {
            let purged = agent.purge_expired()?;
            println!("Purged {} expired sessions.", purged);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, config_error) = load_config(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Folio v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        Some(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Invalid configuration, using defaults")
        }
        None => tracing::debug!(path = %config_file.display(), "Configuration loaded"),
    }

    // Storage.
    let db_path = config.database_path();
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    let store = Arc::new(SqliteSessionStore::new(Arc::new(db)));

    // Agent.
    let llm = build_llm(args.offline, &config);
    let agent = Agent::new(store, llm, &config);

    match args.command {
        Command::Chat { session } => {
            let purged = agent.purge_expired()?;
            tracing::debug!(purged, "Startup purge finished");
            run_chat(&agent, session).await?;
        }
        Command::Ask { message, session } => {
            let outcome = agent.handle_turn(session.as_deref(), &message).await?;
            println!("{}", outcome.reply);
            eprintln!("session: {}", outcome.session_id);
        }
        Command::Sessions { action } => run_sessions(&agent, action)?,
    }

    Ok(())
}
