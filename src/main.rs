use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use echo_cards::clock::{Clock, FixedClock, SystemClock};
use echo_cards::config::Config;
use echo_cards::database::{CardStore, SqliteStore};
use echo_cards::error::Error;
use echo_cards::export::json::{export_deck_json, import_deck_json, restore_deck};
use echo_cards::knowledge::KnowledgeBase;
use echo_cards::session::{
    CommandCall, ConsoleSpeaker, Event, NoRecorder, OfflineAssistant, Output, Runtime,
    SessionController,
};

#[derive(Parser)]
#[command(name = "echo-cards", about = "Spoken-style spaced repetition study sessions", version)]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = "echo_cards.toml")]
    config: PathBuf,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Interactive study session reading commands from stdin (default)
    Session,

    /// List decks with their card and due counts
    Decks,

    /// Write a deck and its schedule to a JSON file
    Export {
        /// Deck name (case-insensitive)
        deck: String,
        path: PathBuf,
    },

    /// Add a deck from a JSON file written by `export`
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let clock: Arc<dyn Clock> = match cli.date {
        Some(date) => Arc::new(FixedClock::on(date)),
        None => Arc::new(SystemClock),
    };
    let today = clock.today();

    let mut store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    if config.seed_sample_decks && store.seed_sample_decks(today)? {
        println!("Sample decks created!");
    }

    match cli.command.unwrap_or(CliCommand::Session) {
        CliCommand::Session => run_session(store, clock, &config).await?,
        CliCommand::Decks => {
            for deck in store.decks()? {
                let cards = store.cards_for_deck(&deck.id)?;
                let due = cards.iter().filter(|c| c.is_due(today)).count();
                println!("{} ({} cards, {} due)", deck.name, cards.len(), due);
            }
        }
        CliCommand::Export { deck, path } => {
            let found = store
                .deck_by_name(&deck)?
                .ok_or_else(|| Error::DeckNotFound(deck.clone()))?;
            let cards = store.cards_for_deck(&found.id)?;
            let count = cards.len();
            export_deck_json(&found, cards, &path)?;
            println!("Exported {} cards to {}", count, path.display());
        }
        CliCommand::Import { path } => {
            let archive = import_deck_json(&path)?;
            let deck = restore_deck(&mut store, &archive, today)?;
            println!("Imported '{}' with {} cards", deck.name, archive.cards.len());
        }
    }

    Ok(())
}

async fn run_session(store: SqliteStore, clock: Arc<dyn Clock>, config: &Config) -> Result<()> {
    let knowledge = KnowledgeBase::default();
    let controller = SessionController::new(store, clock)
        .with_knowledge_base(knowledge.clone())
        .with_weak_point_card_count(config.weak_point_card_count);

    let (runtime, handle, mut outputs) = Runtime::new(
        controller,
        Arc::new(OfflineAssistant::new(knowledge)),
        Box::new(NoRecorder),
        Box::new(ConsoleSpeaker::new(config.voice)),
    );
    let session = tokio::spawn(runtime.run());
    let printer = tokio::spawn(async move {
        while let Some(output) = outputs.recv().await {
            match output {
                Output::Status(text) => println!("[{}]", text),
                Output::Achievement(text) => println!("*** {} ***", text),
                Output::Acknowledged { call_id, name } => debug!("{} acknowledged ({})", name, call_id),
            }
        }
    });

    info!(
        "Session started with voice {}{}",
        config.voice,
        if config.conversational_mode {
            ", questions ending in '?' go to the assistant"
        } else {
            ""
        }
    );
    handle.event(Event::SessionOpened);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        let parsed = if config.conversational_mode && line.ends_with('?') {
            Ok(("startConversation".to_string(), json!({ "query": line })))
        } else {
            parse_line(line)
        };
        match parsed {
            Ok((name, args)) => {
                next_id += 1;
                if !handle.command(CommandCall::new(format!("cli-{next_id}"), name, args)) {
                    break;
                }
            }
            Err(e) => warn!("{:#}", e),
        }
    }

    handle.event(Event::SessionClosed);
    handle.shutdown();
    session.await.context("session runtime panicked")?;
    printer.await.context("output printer panicked")?;
    Ok(())
}

/// Splits `name {json args}` into the command name and its argument bag.
fn parse_line(line: &str) -> Result<(String, Value)> {
    let (name, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    let rest = rest.trim();
    let args = if rest.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(rest)
            .with_context(|| format!("arguments for {name} must be a JSON object"))?
    };
    Ok((name.to_string(), args))
}
