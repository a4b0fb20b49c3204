use std::path::PathBuf;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::RollingFileAppender};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::{
    logging::{config::LoggingConfig, formats},
    LoggingError,
};

/// Файловый слой с ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать до завершения процесса: при его `Drop`
/// оставшиеся записи сбрасываются на диск.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = RollingFileAppender::builder()
        .rotation(config.file.rotation.into())
        .filename_prefix(&config.file.file_prefix)
        .filename_suffix("log")
        .build(&config.file.directory)?;
    let (writer, guard) = non_blocking(appender);

    let layer = formats::build_layer(config.file.format, writer, false, true);
    Ok((layer, guard))
}

/// Каталог, в который пишет файловый слой.
pub fn log_directory(config: &LoggingConfig) -> PathBuf {
    config.file.directory.clone()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::Rotation;

    /// Тест проверяет, что запись через файловый слой попадает в файл с
    /// заданным префиксом.
    #[test]
    fn test_file_layer_writes_to_directory() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = LoggingConfig::default();
        cfg.file.enabled = true;
        cfg.file.directory = tmp.path().to_path_buf();
        cfg.file.file_prefix = "bus".into();
        cfg.file.rotation = Rotation::Never;

        let (layer, guard) = layer_with_config::<Registry>(&cfg).unwrap();
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::info!(topic = "CASE_CREATED", "written to file");
        });
        // сброс буфера неблокирующего writer
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(log_directory(&cfg))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("bus"), "unexpected file name {name}");

        let content = std::fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains("CASE_CREATED"));
    }
}
