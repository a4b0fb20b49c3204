use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::Level;

use super::formats::LogFormat;
use crate::LoggingError;

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error`
    pub level: String,
    /// Дополнительные директивы `EnvFilter`, например `reconbus::pubsub=trace`
    pub directives: Vec<String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

/// Вывод в stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
}

/// Вывод в файлы с ротацией.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub rotation: Rotation,
    pub format: LogFormat,
}

/// Период ротации файла логов.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl LoggingConfig {
    /// Строка директив для `EnvFilter`: уровень, затем директивы.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.trim().is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if self.level.parse::<Level>().is_err() {
            return Err(LoggingError::InvalidConfig(format!(
                "unknown log level '{}'",
                self.level
            )));
        }
        if self.file.enabled && self.file.file_prefix.trim().is_empty() {
            return Err(LoggingError::InvalidConfig(
                "file.file_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Создаёт каталог логов, если файловый вывод включён.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if !self.file.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.file.directory).map_err(|source| LoggingError::LogDir {
            path: self.file.directory.clone(),
            source,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("logs"),
            file_prefix: "reconbus".to_string(),
            rotation: Rotation::Daily,
            format: LogFormat::Json,
        }
    }
}

impl From<Rotation> for tracing_appender::rolling::Rotation {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Minutely => Self::MINUTELY,
            Rotation::Hourly => Self::HOURLY,
            Rotation::Daily => Self::DAILY,
            Rotation::Never => Self::NEVER,
        }
    }
}
