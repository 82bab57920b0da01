// src/main.rs
use rack_planner::api;
use rack_planner::config::{AppConfig, LogFormat};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        let missing = matches!(
            err,
            dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound
        );
        if !missing {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    init_tracing(LogFormat::from_env());

    let app_config = AppConfig::from_env();
    let api_config = app_config.api.clone();
    let optimizer_config = app_config.optimizer.clone();

    info!(
        rack_budget = optimizer_config.default_rack_budget(),
        top_n = optimizer_config.planner_config().top_n,
        "rack planner starting"
    );
    if let Err(err) = api::start_api_server(api_config, optimizer_config).await {
        error!(error = %err, "API server terminated with an error");
        std::process::exit(1);
    }
}
