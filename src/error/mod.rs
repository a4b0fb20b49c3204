use std::{any::Any, io, path::PathBuf};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки загрузки и проверки настроек.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Ошибки инициализации логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid logging config: {0}")]
    InvalidConfig(String),

    #[error("Failed to create log directory {}: {source}", path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("Global tracing subscriber is already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidConfig
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_) => StatusCode::InvalidConfig,
            Self::LogDir { .. } | Self::Appender(_) => StatusCode::Io,
            Self::AlreadyInitialized(_) => StatusCode::LoggingInit,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
