//! Parlance server entry point.
//!
//! Binary name: `parlance`
//!
//! Parses CLI arguments, wires storage and services, then starts the HTTP
//! server (realtime WebSocket, WhatsApp webhook, management REST).

mod http;
mod state;

use clap::{Parser, Subcommand};

use state::AppState;

#[derive(Parser)]
#[command(name = "parlance", version, about = "Conversation orchestration and streaming engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Override the configured bind port.
        #[arg(long)]
        port: Option<u16>,
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Export spans via OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },
    /// Create the data directory and run database migrations, then exit.
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let enable_otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    parlance_observe::tracing_setup::init_tracing(enable_otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    match cli.command {
        Commands::InitDb => {
            println!(
                "  {} Database ready at {}",
                console::style("✓").green(),
                console::style(state.data_dir.display()).cyan()
            );
        }

        Commands::Serve { port, host, .. } => {
            let host = host.unwrap_or_else(|| state.settings.host.clone());
            let port = port.unwrap_or(state.settings.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Parlance listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    parlance_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
