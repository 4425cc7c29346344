//! greetwatch HTTP server
//!
//! Builds every route and metric before binding the listener, so a
//! registration conflict stops the process before it serves traffic.

use clap::Parser;
use greetwatch::{
    app,
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::AppState,
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = &cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(path, template)?;
                eprintln!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let (config_path, explicit) = cli.config_path();
    let config = if explicit {
        Config::from_file(config_path)?
    } else {
        Config::from_file_or_default(config_path)?
    };

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    let state = AppState::new(Arc::new(config))?;
    let dispatcher = app::build(&state)?;

    let address = state.config().listen_address();
    tracing::info!(address = %address, "Starting the application server...");

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        "Serving {}, {}, {} and {} on {}",
        app::WELCOME_ENDPOINT,
        app::BIRTHDAY_ENDPOINT,
        app::GREETING_ENDPOINT,
        app::METRICS_ENDPOINT,
        listener.local_addr()?
    );

    axum::serve(listener, dispatcher.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
