use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки ожидающего получения сообщений из подписки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvError {
    /// Подписка отменена и буфер вычитан полностью.
    Closed,
    /// Буфер переполнился, `count` самых старых сообщений вытеснено.
    Lagged { count: u64 },
}

/// Ошибки неблокирующего получения сообщений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    /// Нет доступных сообщений
    Empty,
    /// Подписка отменена и буфер вычитан полностью.
    Closed,
    /// Получатель отстал
    Lagged { count: u64 },
}

/// Ошибки создания подписки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// Не указан ни один топик
    EmptyTopicSet,
    /// Недопустимая ёмкость буфера
    InvalidCapacity { requested: usize, max: usize },
    /// Топик не может быть построен (пустой id сущности, неизвестное имя
    /// события)
    InvalidTopic { topic: String, reason: String },
}

/// Сбой вычисления предиката фильтрации.
///
/// Изолирован в пределах одной подписки: издатель его не видит.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// Предикат вернул ошибку
    Rejected { reason: String },
    /// Предикат запаниковал
    Panicked { message: String },
}

impl PredicateError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Строит ошибку из payload паники, пойманной `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

impl std::fmt::Display for RecvError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Subscription is closed"),
            Self::Lagged { count } => write!(f, "Subscriber lagged behind by {count} messages"),
        }
    }
}

impl std::error::Error for RecvError {}

impl ErrorExt for RecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed => StatusCode::ChannelClosed,
            Self::Lagged { .. } => StatusCode::SubscriberLagged,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub_recv".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Self::Lagged { count } = self {
            tags.push(("lagged_count", count.to_string()));
        }

        tags
    }
}

impl std::fmt::Display for TryRecvError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "No messages available"),
            Self::Closed => write!(f, "Subscription is closed"),
            Self::Lagged { count } => write!(f, "Subscriber lagged behind by {count} messages"),
        }
    }
}

impl std::error::Error for TryRecvError {}

impl ErrorExt for TryRecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Empty => StatusCode::ChannelEmpty,
            Self::Closed => StatusCode::ChannelClosed,
            Self::Lagged { .. } => StatusCode::SubscriberLagged,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Display for SubscribeError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::EmptyTopicSet => write!(f, "Subscription requires at least one topic"),
            Self::InvalidCapacity { requested, max } => {
                write!(
                    f,
                    "Invalid buffer capacity {requested}: must be between 1 and {max}"
                )
            }
            Self::InvalidTopic { topic, reason } => {
                write!(f, "Invalid topic '{topic}': {reason}")
            }
        }
    }
}

impl std::error::Error for SubscribeError {}

impl ErrorExt for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyTopicSet => StatusCode::EmptyTopicSet,
            Self::InvalidCapacity { .. } => StatusCode::InvalidCapacity,
            Self::InvalidTopic { .. } => StatusCode::InvalidTopic,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub_subscribe".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::InvalidCapacity { requested, max } => {
                tags.push(("requested_capacity", requested.to_string()));
                tags.push(("max_capacity", max.to_string()));
            }
            Self::InvalidTopic { topic, .. } => {
                tags.push(("topic", topic.clone()));
            }
            Self::EmptyTopicSet => {}
        }

        tags
    }
}

impl std::fmt::Display for PredicateError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "Filter predicate failed: {reason}"),
            Self::Panicked { message } => write!(f, "Filter predicate panicked: {message}"),
        }
    }
}

impl std::error::Error for PredicateError {}

impl ErrorExt for PredicateError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected { .. } => StatusCode::PredicateFailed,
            Self::Panicked { .. } => StatusCode::PredicatePanicked,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        "Subscription filter failed".to_string()
    }
}
