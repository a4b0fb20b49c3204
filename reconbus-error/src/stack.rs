use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка с цепочкой контекстов.
///
/// Корневая ошибка хранится как `Arc<dyn ErrorExt>`, контексты добавляются
/// по мере подъёма по вызовам и запоминают место вызова.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    trail: Vec<ErrorContext>,
}

/// Один уровень контекста.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

/// Представление ошибки для отдачи наружу: код, безопасное сообщение и,
/// в отладочной сборке, цепочка контекстов.
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            trail: Vec::new(),
        }
    }

    /// Добавляет уровень контекста с местом вызова.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.trail.push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Контексты в порядке добавления: первый ближе всего к корню.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.trail
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    #[cfg(feature = "serde")]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.status_code().code(),
            message: self.client_message(),
            contexts: cfg!(debug_assertions).then(|| self.located_trail()),
        }
    }

    fn located_trail(&self) -> Vec<String> {
        self.trail
            .iter()
            .map(|ctx| match ctx.location {
                Some(loc) => format!("{} at {}:{}", ctx.message, loc.file(), loc.line()),
                None => ctx.message.clone(),
            })
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StackError")
            .field("status_code", &self.status_code())
            .field("root", &self.root.log_message())
            .field("trail", &self.located_trail())
            .finish()
    }
}

/// Внешний контекст печатается первым: `resolver: subscribe X: root`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for ctx in self.trail.iter().rev() {
            write!(f, "{}: ", ctx.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
