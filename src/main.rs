use std::{error::Error, net::SocketAddr, process::ExitCode};

use cashbook::{
    api::{self, AppState},
    config::{CliArgs, Command, Config},
    logging,
    service::{Cashbook, DatePolicy},
    storage,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;

type AnyResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    logging::init(&config.logging);

    match run(cli.command.unwrap_or(Command::Serve), &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "cashbook stopped");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// Storage is opened and dropped outside the tokio runtime: the blocking
// PostgreSQL client must not be created or torn down on an async worker.
fn run(command: Command, config: &Config) -> AnyResult<()> {
    let policy = DatePolicy {
        zone: config.display_zone()?,
        allow_missing_date: config.dates.allow_missing_date,
    };
    let service = Cashbook::new(storage::open(&config.storage)?, policy);

    match command {
        Command::Serve => {
            let addr = config.listen_addr()?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(addr, service.clone()))?;
        }
        Command::Report { date } => {
            let report = service.daily_report(date.as_deref())?;
            println!("{}", report);
        }
        Command::Check => {
            let diagnostics = service.diagnostics();
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            if !diagnostics.is_healthy() {
                return Err("storage backend is not reachable".into());
            }
        }
    }

    Ok(())
}

async fn serve(addr: SocketAddr, service: Cashbook) -> AnyResult<()> {
    let metrics = PrometheusBuilder::new().install_recorder()?;
    let app = api::router(AppState::new(service, Some(metrics)));

    tracing::info!(%addr, "API listening");

    axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
