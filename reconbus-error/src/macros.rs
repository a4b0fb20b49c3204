/// Возвращает `Err(StackError)` из текущей функции.
///
/// `bail!(err)` принимает любую ошибку, приводимую к [`StackError`];
/// `bail!(code, "fmt", args..)` строит [`GenericError`] с кодом статуса.
///
/// ```ignore
/// fn check_entity_id(id: &str) -> ReconbusResult<()> {
///     if id.is_empty() {
///         bail!(StatusCode::InvalidTopic, "entity id is empty");
///     }
///     Ok(())
/// }
/// ```
///
/// [`StackError`]: crate::StackError
/// [`GenericError`]: crate::GenericError
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($($fmt)+))
        ))
    };
}

/// `bail!`, если условие ложно. Формы аргументов те же.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Приводит ошибку `Result` к [`StackError`](crate::StackError) и добавляет
/// контекст; сообщение форматируется как в `format!`.
///
/// Удобен там, где трейт `ResultExt` конфликтует с одноимённым методом
/// другого крейта (например, `anyhow::Context`).
#[macro_export]
macro_rules! context {
    ($result:expr, $($fmt:tt)+) => {
        match $result {
            Ok(val) => Ok(val),
            Err(e) => Err($crate::StackError::from(e).context(format!($($fmt)+))),
        }
    };
}

/// `.context(..)` и ленивый `.with_context(..)` для любого `Result`, ошибка
/// которого приводится к [`StackError`](crate::StackError).
pub trait ResultExt<T> {
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenericError, ReconbusResult, StatusCode, SubscribeError};

    #[test]
    fn test_bail_typed_error() {
        fn subscribe_nothing() -> ReconbusResult<()> {
            bail!(SubscribeError::EmptyTopicSet);
        }

        let err = subscribe_nothing().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::EmptyTopicSet);
    }

    #[test]
    fn test_bail_with_format() {
        fn example(capacity: usize) -> ReconbusResult<()> {
            bail!(StatusCode::InvalidCapacity, "Invalid capacity: {}", capacity);
        }

        let err = example(0).unwrap_err();
        assert!(err.to_string().contains("Invalid capacity: 0"));
    }

    #[test]
    fn test_ensure() {
        fn validate(capacity: usize) -> ReconbusResult<()> {
            ensure!(capacity > 0, StatusCode::InvalidCapacity, "Capacity must be positive");
            ensure!(
                capacity <= 1024,
                StatusCode::InvalidCapacity,
                "Capacity too large: {}",
                capacity
            );
            Ok(())
        }

        assert!(validate(64).is_ok());
        assert!(validate(0).is_err());
        assert!(validate(4096).is_err());
    }

    #[test]
    fn test_context_macro() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::InvalidConfig, "bad value"))
        }

        let res: ReconbusResult<()> = context!(inner(), "loading {}", "pubsub");
        let err = res.unwrap_err();
        assert_eq!(err.contexts()[0].message, "loading pubsub");
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Internal, "inner error"))
        }

        fn outer() -> ReconbusResult<()> {
            inner().context("outer context")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "outer context");
    }

    #[test]
    fn test_with_context_lazy() {
        fn example(success: bool) -> ReconbusResult<()> {
            let result: Result<(), GenericError> = if success {
                Ok(())
            } else {
                Err(GenericError::new(StatusCode::Internal, "error"))
            };

            result.with_context(|| format!("attempt success={success}"))?;
            Ok(())
        }

        assert!(example(true).is_ok());
        assert!(example(false).is_err());
    }
}
