//! Document chat REPL
//!
//! Loads a PDF and answers questions about it over the turn-based
//! generation API.

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use study_voice::chat::{ChatClient, ChatTurn};
use study_voice::config::AppConfig;
use study_voice::knowledge::Knowledge;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load();
    if !config.has_credential() {
        println!();
        println!("==============================================================");
        println!("  GEMINI_API_KEY is not set.");
        println!("  Chat cannot start without an API credential.");
        println!("  Export it or add it to a .env file, then run again.");
        println!("==============================================================");
        return Ok(());
    }

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: chat <document.pdf>");
    };

    let data = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    let knowledge = Knowledge::from_pdf_bytes(&data)
        .with_context(|| format!("no usable text in {path}; try a different file"))?;
    println!(
        "Loaded {} ({} characters of text extracted)",
        path,
        knowledge.char_count()
    );

    let client = ChatClient::new(&config)?;
    let mut history: Vec<ChatTurn> = Vec::new();

    println!("Ask anything about the document. Type 'exit' to quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        history.push(ChatTurn::user(line));
        match client.respond(&knowledge, &history).await {
            Ok(reply) => {
                println!("tutor> {reply}\n");
                history.push(ChatTurn::model(reply));
            }
            Err(e) => {
                println!("tutor> (request failed: {e})\n");
                // Keep the history consistent with what the model has seen
                history.pop();
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
