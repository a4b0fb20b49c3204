use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Фильтр событий.
///
/// `RUST_LOG`, если задан, перекрывает конфигурацию. Некорректная директива
/// из конфигурации заменяется на `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return env_filter;
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'info'");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::info!("info message");
            tracing::warn!("warn message");
        });
        let out = buffer.lock().unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Тест проверяет, что уровень из конфигурации отсекает info.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "warn".into(),
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&config));
        assert!(out.contains("warn message"));
        assert!(!out.contains("info message"));
    }

    /// Тест проверяет откат на `info` при некорректной директиве.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            directives: vec!["reconbus=notalevel".into()],
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&config));
        assert!(out.contains("info message"));
    }

    /// Тест проверяет приоритет `RUST_LOG` над конфигурацией.
    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let config = LoggingConfig::default();
        let out = capture(build_filter_from_config(&config));
        env::remove_var("RUST_LOG");

        assert!(!out.contains("warn message"));
        assert!(!out.contains("info message"));
    }
}
