use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use works_bot::cli::{self, Commands, SecretCommands, TokenCommands};
use works_bot::models::token::RefreshMarker;
use works_bot::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Export spans over OTLP when an endpoint is configured; stdout logging otherwise.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "works-bot"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "works_bot=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = match args.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(Commands::Token { command }) => handle_token_command(cfg, command).await,
        Some(Commands::Secret { command }) => handle_secret_command(cfg, command).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!(backend = ?cfg.secret_backend, "Initializing secret store...");
    let state = Arc::new(AppState::from_config(cfg)?);
    if !state.alerts.is_enabled() {
        tracing::warn!("No alert webhook configured; processing failures are only logged");
    }

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("works-bot listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_token_command(cfg: config::Config, command: TokenCommands) -> anyhow::Result<()> {
    let state = AppState::from_config(cfg)?;
    match command {
        TokenCommands::Refresh => {
            let outcome = state
                .tokens
                .refresh_or_bootstrap(state.idp.as_ref(), state.store.as_ref())
                .await?;
            println!(
                "✅ Access token updated via {:?} (version {}, refresh token rotated: {})",
                outcome.path, outcome.access_version, outcome.refresh_rotated
            );
        }
        TokenCommands::Init => {
            let version = state
                .store
                .put(&state.config.secret_names.refresh_token, RefreshMarker::SENTINEL)
                .await?;
            println!(
                "✅ {} reset to '{}' (version {}); the next refresh will bootstrap",
                state.config.secret_names.refresh_token,
                RefreshMarker::SENTINEL,
                version
            );
        }
    }
    Ok(())
}

async fn handle_secret_command(cfg: config::Config, command: SecretCommands) -> anyhow::Result<()> {
    let store = works_bot::vault::from_config(&cfg)?;
    match command {
        SecretCommands::Put { name, value } => {
            let version = store.put(&name, &value).await?;
            println!("✅ Stored {} (version {})", name, version);
        }
    }
    Ok(())
}
