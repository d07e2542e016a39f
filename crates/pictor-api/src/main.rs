use pictor_core::Config;
use pictor_infra::{init_telemetry, LogFormat};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let log_format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or(LogFormat::Pretty);
    init_telemetry("pictor-api", log_format)?;

    let (_state, router) = pictor_api::setup::initialize_app(config.clone()).await?;

    pictor_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
