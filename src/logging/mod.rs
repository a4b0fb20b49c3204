//! Логирование на `tracing`: консоль и файлы с ротацией.

pub mod config;
mod filters;
pub mod formats;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LoggingConfig, Rotation};
pub use formats::LogFormat;
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingError;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов в том же процессе
/// возвращает [`LoggingError::AlreadyInitialized`].
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(config));
    }

    let (file_guard, log_dir) = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(config)?;
        layers.push(file_layer);
        (Some(guard), Some(sinks::file::log_directory(config)))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        console_enabled = config.console.enabled,
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard, log_dir))
}
