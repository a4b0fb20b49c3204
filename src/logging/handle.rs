use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового writer'а: пока handle жив, записи сбрасываются
/// на диск фоновым потоком.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
    shutdown_in_progress: AtomicBool,
}

impl LoggingHandle {
    pub fn new(
        file_guard: Option<WorkerGuard>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            file_guard,
            log_dir,
            shutdown_in_progress: AtomicBool::new(false),
        }
    }

    /// Каталог файлового вывода, если он включён.
    pub fn log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref()
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    /// Завершает логирование: сбрасывает буфер файлового writer'а.
    pub fn shutdown(mut self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
        tracing::info!(
            file_sink = self.file_guard.is_some(),
            "Logging shutdown initiated"
        );

        let start = std::time::Instant::now();
        drop(self.file_guard.take());

        // Файловый writer уже закрыт, сообщение уйдёт только в консоль.
        tracing::debug!(
            shutdown_duration_ms = start.elapsed().as_millis() as u64,
            "Logging shutdown completed"
        );
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.file_guard.is_some())
            .field("log_dir", &self.log_dir)
            .field("shutdown_in_progress", &self.is_shutdown_in_progress())
            .finish()
    }
}
