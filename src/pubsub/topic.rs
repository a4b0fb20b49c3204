use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::SubscribeError;

/// Ключ топика.
///
/// Непрозрачная строка, сравниваемая только на точное совпадение. Диспетчер
/// никогда её не разбирает. Клонирование дешёвое (`Arc<str>`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(Arc<str>);

/// Имя события из фиксированного набора, общего для издателей и подписчиков.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    SimulationStarted,
    SimulationProgress,
    SimulationCompleted,
    SimulationFailed,
    CaseCreated,
    CaseUpdated,
    CaseDeleted,
}

/// Тип сущности, идентификатор которой сужает топик.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Simulation,
    Case,
    Organization,
}

/// На какие ключи публикуется событие.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicScope {
    /// Только `EVENT_NAME`.
    Global,
    /// Только `EVENT_NAME_{entityId}`.
    Entity(EntityKind),
    /// Оба ключа.
    GlobalAndEntity(EntityKind),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TopicKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl EventName {
    /// Правила публикации для события.
    pub const fn scope(self) -> TopicScope {
        match self {
            Self::SimulationProgress => TopicScope::Entity(EntityKind::Simulation),
            Self::SimulationStarted | Self::SimulationCompleted | Self::SimulationFailed => {
                TopicScope::GlobalAndEntity(EntityKind::Simulation)
            }
            Self::CaseCreated => TopicScope::Global,
            Self::CaseUpdated | Self::CaseDeleted => TopicScope::GlobalAndEntity(EntityKind::Case),
        }
    }

    /// Тип сущности, которым сужается топик, если он есть.
    pub const fn entity_kind(self) -> Option<EntityKind> {
        match self.scope() {
            TopicScope::Global => None,
            TopicScope::Entity(kind) | TopicScope::GlobalAndEntity(kind) => Some(kind),
        }
    }

    pub const fn has_global_key(self) -> bool {
        matches!(
            self.scope(),
            TopicScope::Global | TopicScope::GlobalAndEntity(_)
        )
    }
}

/// Глобальный ключ события: `EVENT_NAME`.
pub fn global_key(event: EventName) -> TopicKey {
    TopicKey::new(event.as_ref())
}

/// Ключ, суженный идентификатором сущности: `EVENT_NAME_{entityId}`.
///
/// Пустой идентификатор отклоняется: иначе получился бы ключ `EVENT_NAME_`,
/// не совпадающий ни с одной подпиской.
pub fn scoped_key(
    event: EventName,
    entity_id: &str,
) -> Result<TopicKey, SubscribeError> {
    if entity_id.is_empty() {
        return Err(SubscribeError::InvalidTopic {
            topic: format!("{}_", event.as_ref()),
            reason: "entity id is empty".to_string(),
        });
    }
    Ok(TopicKey::new(format!("{}_{entity_id}", event.as_ref())))
}

/// Разбирает имя события из строки (`"CASE_UPDATED"`).
pub fn parse_event_name(name: &str) -> Result<EventName, SubscribeError> {
    name.parse().map_err(|_| SubscribeError::InvalidTopic {
        topic: name.to_string(),
        reason: "unknown event name".to_string(),
    })
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for TopicKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TopicKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TopicKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for TopicKey {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<&TopicKey> for TopicKey {
    fn from(k: &TopicKey) -> Self {
        k.clone()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
