use std::io::Write;
use std::sync::Arc;

use clap::Args;
use itertools::Itertools;
use miette::{IntoDiagnostic, Result};
use shared::Turn;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::args::{GenerationArgs, ModelArgs};
use crate::controller::InteractionController;
use crate::generation::ResponseGenerator;

#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

/// Terminal chat: one session on stdin, redrawn on every change.
pub async fn run(args: &ChatArgs) -> Result<()> {
    let model = Arc::new(args.model.shared_model());
    if model.get().await.is_none() {
        let reason = model.load_error().unwrap_or("unknown error");
        eprintln!("Model failed to load: {reason}");
    }

    let generator = ResponseGenerator::new(model, args.generation.config());
    let mut controller = InteractionController::new(generator);
    let renderer = tokio::spawn(render(controller.subscribe()));

    println!("Type 'quit' to exit");
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.into_diagnostic()? {
        if line.trim().eq_ignore_ascii_case("quit") {
            break;
        }
        controller.submit(&line).await;
    }

    // Dropping the controller closes the channel and ends the renderer.
    drop(controller);
    renderer.await.into_diagnostic()?;
    println!("Goodbye!");

    Ok(())
}

async fn render(mut changes: watch::Receiver<Vec<Turn>>) {
    while changes.changed().await.is_ok() {
        let screen = transcript(&changes.borrow_and_update());
        println!("\x1b[2J\x1b[H{screen}");
        if prompt().is_err() {
            break;
        }
    }
}

fn prompt() -> Result<()> {
    print!("You: ");
    std::io::stdout().flush().into_diagnostic()
}

pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role(), turn.content()))
        .join("\n")
}
