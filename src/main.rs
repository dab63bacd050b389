use clap::Parser;
use pixel_truth::{engine_from_args, setup_logging, Cli, CliRunner, Metrics};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting pixel-truth v{}", env!("CARGO_PKG_VERSION"));

    let engine = engine_from_args(&args);
    info!("Automation endpoint: {}", engine.automation_endpoint);
    info!("Max sessions: {}", engine.max_sessions);

    let metrics = Arc::new(Metrics::new());
    let runner = CliRunner::new(engine, metrics);

    let result = tokio::select! {
        result = runner.run(args.command) => result,
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
