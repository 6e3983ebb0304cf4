//! TOEFL Prep - practice client
//!
//! Command-line front end over the session, section and timer components.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toefl_core::ClientConfig;

mod cli;
mod error;
mod session;
mod state;
mod viewmodel;
mod widgets;

use cli::Cli;
use error::Result;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::debug!("Starting TOEFL Prep");

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load()?;
    cli.apply(&mut config);

    let state = state::AppState::new(config)?;
    let session = state.session();
    session.restore()?;

    let result = cli::dispatch(cli.command, &state).await;
    session.close();
    result
}
