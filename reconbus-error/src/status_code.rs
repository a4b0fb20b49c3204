use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 4xxx: Перегрузка подписчиков
/// - 5xxx: Сериализация
/// - 6xxx: Каналы доставки / IO
/// - 7xxx: Подписки и топики
/// - 8xxx: Предикаты фильтрации
/// - 9xxx: Конфигурация и окружение
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,
    InvalidData = 2002,

    // === 4xxx: Перегрузка ===
    SubscriberLagged = 4000,
    SubscriberLimitExceeded = 4001,

    // === 5xxx: Сериализация ===
    SerializationFailed = 5000,
    DeserializationFailed = 5001,

    // === 6xxx: Доставка/IO ===
    Io = 6000,
    ChannelClosed = 6001,
    ChannelEmpty = 6002,

    // === 7xxx: Подписки/топики ===
    EmptyTopicSet = 7000,
    InvalidTopic = 7001,
    InvalidCapacity = 7002,

    // === 8xxx: Предикаты ===
    PredicateFailed = 8000,
    PredicatePanicked = 8001,

    // === 9xxx: Конфигурация ===
    InvalidConfig = 9000,
    LoggingInit = 9001,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающей стороны: неверные аргументы подписки, топики,
    /// ёмкость буфера.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=2999).contains(&c) || (7000..=7999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Ошибка на стороне подписчика, не влияющая на издателя: отставание,
    /// сбой предиката.
    ///
    /// Такие ошибки никогда не доходят до `publish`.
    pub fn is_subscriber_local(&self) -> bool {
        matches!(
            self,
            Self::SubscriberLagged | Self::PredicateFailed | Self::PredicatePanicked
        )
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::LoggingInit)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::ChannelEmpty => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists | Self::ChannelClosed => LogLevel::Debug,
            Self::SubscriberLagged => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidData
            | Self::EmptyTopicSet
            | Self::InvalidTopic
            | Self::InvalidCapacity => LogLevel::Info,
            Self::PredicateFailed | Self::PredicatePanicked | Self::InvalidConfig => {
                LogLevel::Warn
            }
            Self::Internal | Self::LoggingInit => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Если включён feature "strum", используем human-readable имя (AsRefStr).
        // Иначе Debug-имя.
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
