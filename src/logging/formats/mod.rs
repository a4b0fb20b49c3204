use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

/// Формат записей лога.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный, для разработки
    Pretty,
    /// Одна строка на событие
    #[default]
    Compact,
    /// JSON, для сборщиков логов
    Json,
}

/// Строит fmt-слой заданного формата поверх `writer`.
///
/// Тип формата стирается в trait-объект, чтобы консольный и файловый
/// вывод можно было собрать в один `Vec` слоёв.
pub fn build_layer<S, W>(
    format: LogFormat,
    writer: W,
    with_ansi: bool,
    with_target: bool,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .event_format(fmt::format().pretty())
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(with_target)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .event_format(fmt::format().compact())
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(with_target),
        ),
        LogFormat::Json => Box::new(
            fmt::layer()
                .event_format(fmt::format().json().with_current_span(true))
                .with_writer(writer)
                .with_ansi(false)
                .with_target(with_target)
                .with_thread_names(true),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
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

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Тест проверяет, что JSON-слой пишет поля события как JSON.
    #[test]
    fn test_json_layer_writes_fields() {
        let buffer = Buffer::default();
        let layer = build_layer::<Registry, _>(LogFormat::Json, buffer.clone(), false, true);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(subscription_id = "sub-1", topic = "CASE_UPDATED", "predicate failed");
        });

        let out = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["topic"], "CASE_UPDATED");
    }

    /// Тест проверяет, что все форматы строятся и пишут.
    #[test]
    fn test_every_format_writes() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let buffer = Buffer::default();
            let layer = build_layer::<Registry, _>(format, buffer.clone(), false, false);
            tracing::subscriber::with_default(Registry::default().with(layer), || {
                tracing::info!("hello from {format}");
            });
            assert!(!buffer.0.lock().unwrap().is_empty(), "{format} wrote nothing");
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
