use crate::models::config::LoggingConfig;
use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stdout plus a daily-rolled JSON file under `config.directory`. Keep the
/// returned guard alive for the lifetime of the process or buffered file
/// output is lost.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.directory)?;

    let file_appender = tracing_appender::rolling::daily(&config.directory, "aviator.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = format!("{},tower_http=warn,hyper=warn", config.level.to_lowercase());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer().with_writer(std::io::stdout).with_ansi(true))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false).json())
        .try_init()?;

    info!("Logging initialized");
    Ok(guard)
}
