//! Live voice session
//!
//! Loads a PDF, extracts its text, and holds a real-time voice conversation
//! about it until the session ends or Ctrl+C.

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use study_voice::audio::device::describe_devices;
use study_voice::config::AppConfig;
use study_voice::knowledge::Knowledge;
use study_voice::session::VoiceSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load();
    if !config.has_credential() {
        println!();
        println!("==============================================================");
        println!("  GEMINI_API_KEY is not set.");
        println!("  Voice sessions cannot start without an API credential.");
        println!("  Export it or add it to a .env file, then run again.");
        println!("==============================================================");
        return Ok(());
    }

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: voice <document.pdf>");
    };

    let data = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    let knowledge = Knowledge::from_pdf_bytes(&data)
        .with_context(|| format!("no usable text in {path}; try a different file"))?;
    println!(
        "Loaded {} ({} characters of text extracted)",
        path,
        knowledge.char_count()
    );

    let (input, output) = describe_devices();
    println!("\n=== Audio Devices ===");
    println!("  Microphone: {}", input.as_deref().unwrap_or("none found"));
    println!("  Speakers:   {}", output.as_deref().unwrap_or("none found"));
    println!();

    let mut session = VoiceSession::start(config, knowledge)?;
    let mut status = session.status();

    println!("Starting voice session - press Ctrl+C to stop\n");

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                println!("[{:?}] {}", current.state, current.message);
                if current.state.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping session...");
                break;
            }
        }
    }

    session.stop().await;
    println!("Goodbye!");
    Ok(())
}
