use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dialogbot::args::{GenerationArgs, ModelArgs};
use dialogbot::telemetry;
use miette::{IntoDiagnostic, Result};
use tracing::info;

mod app;
mod pages;
mod sessions;

#[derive(Debug, Parser)]
#[command(name = "server", about = "Serve the dialogue chatbot over HTTP")]
struct Opt {
    #[arg(long, env = "DIALOGBOT_BIND", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    #[arg(long, env = "DIALOGBOT_MAX_SESSIONS", default_value_t = 1000)]
    max_sessions: usize,

    #[arg(
        long,
        env = "DIALOGBOT_SESSION_IDLE_MINUTES",
        default_value_t = 60,
        help = "Conversations idle this long are dropped"
    )]
    session_idle_minutes: u64,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    generation: GenerationArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing().into_diagnostic()?;
    let opt = Opt::parse();

    // Load up front so a broken model directory is reported once, at startup.
    let model = Arc::new(opt.model.shared_model());
    if model.get().await.is_some() {
        info!(dir = %opt.model.model_dir.display(), "model ready");
    }

    let limits = sessions::SessionLimits {
        max_sessions: opt.max_sessions.max(1),
        idle_ttl: Duration::from_secs(opt.session_idle_minutes * 60),
    };
    let state = app::AppState::new(model, opt.generation.config(), limits);
    let app = app::router(state);

    info!(addr = %opt.bind, "listening");
    axum::Server::try_bind(&opt.bind)
        .into_diagnostic()?
        .serve(app.into_make_service())
        .await
        .into_diagnostic()?;

    Ok(())
}
