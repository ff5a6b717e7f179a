use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use dialogbot::{chat::ChatArgs, prepare::PrepareArgs, telemetry};

#[derive(Debug, Parser)]
#[command(name = "dialogbot", about = "Chat with a pretrained dialogue model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Clean and split a dialogue file, smoke test the model and save it
    Prepare(PrepareArgs),
    /// Chat in the terminal
    Chat(ChatArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing().into_diagnostic()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare(args) => {
            dialogbot::prepare::run(&args, &mut std::io::stdout()).await?;
        }
        Commands::Chat(args) => dialogbot::chat::run(&args).await?,
    }

    Ok(())
}
