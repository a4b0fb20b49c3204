use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{
    logging::LoggingConfig,
    pubsub::{DispatcherConfig, DEFAULT_CAPACITY, MAX_CAPACITY},
    SettingsError,
};

/// Префикс переменных окружения: `RECONBUS_PUBSUB__DEFAULT_CAPACITY=64`.
pub const ENV_PREFIX: &str = "RECONBUS";

/// Настройки процесса.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pubsub: PubSubSettings,
    pub logging: LoggingConfig,
}

/// Настройки диспетчера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    /// Ёмкость буфера подписки по умолчанию
    pub default_capacity: usize,
    /// Максимальная ёмкость, которую может запросить подписка
    pub max_capacity: usize,
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и окружения.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(None)
    }

    /// Загружает настройки слоями: значения по умолчанию, затем TOML-файл
    /// (если указан), затем переменные окружения `RECONBUS_*`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("pubsub.default_capacity", DEFAULT_CAPACITY as u64)?
            .set_default("pubsub.max_capacity", MAX_CAPACITY as u64)?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            );
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let pubsub = &self.pubsub;
        if pubsub.default_capacity == 0 {
            return Err(SettingsError::Invalid(
                "pubsub.default_capacity must be at least 1".to_string(),
            ));
        }
        if pubsub.default_capacity > pubsub.max_capacity {
            return Err(SettingsError::Invalid(format!(
                "pubsub.default_capacity ({}) exceeds pubsub.max_capacity ({})",
                pubsub.default_capacity, pubsub.max_capacity
            )));
        }
        self.logging
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))
    }
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            max_capacity: MAX_CAPACITY,
        }
    }
}

impl From<PubSubSettings> for DispatcherConfig {
    fn from(settings: PubSubSettings) -> Self {
        Self {
            default_capacity: settings.default_capacity,
            max_capacity: settings.max_capacity,
        }
    }
}
