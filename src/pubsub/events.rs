//! Доменные события, которые публикуют симуляция и сервис дел.
//!
//! Диспетчеру безразлична форма payload; фасаду публикации и встроенным
//! предикатам нужен лишь способ найти идентификатор сущности внутри него,
//! это трейт [`EventPayload`].

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityKind, EventName};

/// Payload, из которого можно извлечь идентификаторы сущностей.
pub trait EventPayload: Send + Sync + 'static {
    /// Идентификатор сущности заданного типа, если он есть в payload.
    fn entity_id(
        &self,
        kind: EntityKind,
    ) -> Option<Cow<'_, str>>;
}

/// Статус симуляции.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Событие жизненного цикла симуляции.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationEvent {
    pub simulation_id: String,
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub status: SimulationStatus,
    /// Прогресс в процентах, `0..=100`.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Событие изменения дела (case).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseEvent {
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub name: String,
    pub revision: u64,
}

/// Сумма всех доменных событий.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReconEvent {
    Simulation(SimulationEvent),
    Case(CaseEvent),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SimulationEvent {
    pub fn new(
        simulation_id: impl Into<String>,
        case_id: impl Into<String>,
    ) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            case_id: case_id.into(),
            organization_id: None,
            status: SimulationStatus::Queued,
            progress: 0,
            message: None,
        }
    }

    pub fn with_organization(
        mut self,
        organization_id: impl Into<String>,
    ) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Снимок в состоянии `Running` с заданным прогрессом (обрезается до 100).
    pub fn running(
        &self,
        progress: u8,
    ) -> Self {
        Self {
            status: SimulationStatus::Running,
            progress: progress.min(100),
            ..self.clone()
        }
    }

    pub fn completed(&self) -> Self {
        Self {
            status: SimulationStatus::Completed,
            progress: 100,
            ..self.clone()
        }
    }

    pub fn failed(
        &self,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: SimulationStatus::Failed,
            message: Some(message.into()),
            ..self.clone()
        }
    }
}

impl ReconEvent {
    /// Естественное имя события для payload.
    pub fn event_name(&self) -> EventName {
        match self {
            Self::Simulation(sim) => match sim.status {
                SimulationStatus::Queued => EventName::SimulationStarted,
                SimulationStatus::Running => EventName::SimulationProgress,
                SimulationStatus::Completed => EventName::SimulationCompleted,
                SimulationStatus::Failed => EventName::SimulationFailed,
            },
            Self::Case(case) if case.revision == 0 => EventName::CaseCreated,
            Self::Case(_) => EventName::CaseUpdated,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализации EventPayload
////////////////////////////////////////////////////////////////////////////////

impl EventPayload for SimulationEvent {
    fn entity_id(
        &self,
        kind: EntityKind,
    ) -> Option<Cow<'_, str>> {
        match kind {
            EntityKind::Simulation => Some(Cow::Borrowed(&self.simulation_id)),
            EntityKind::Case => Some(Cow::Borrowed(&self.case_id)),
            EntityKind::Organization => self.organization_id.as_deref().map(Cow::Borrowed),
        }
    }
}

impl EventPayload for CaseEvent {
    fn entity_id(
        &self,
        kind: EntityKind,
    ) -> Option<Cow<'_, str>> {
        match kind {
            EntityKind::Simulation => None,
            EntityKind::Case => Some(Cow::Borrowed(&self.case_id)),
            EntityKind::Organization => self.organization_id.as_deref().map(Cow::Borrowed),
        }
    }
}

impl EventPayload for ReconEvent {
    fn entity_id(
        &self,
        kind: EntityKind,
    ) -> Option<Cow<'_, str>> {
        match self {
            Self::Simulation(sim) => sim.entity_id(kind),
            Self::Case(case) => case.entity_id(kind),
        }
    }
}

/// Payload в форме GraphQL-ответа: `{"simulation": {"id": "42"}, ...}`.
///
/// Идентификаторы ищутся по вложенному объекту, затем по плоскому полю
/// `<kind>Id`. Числа приводятся к десятичной строке.
impl EventPayload for Value {
    fn entity_id(
        &self,
        kind: EntityKind,
    ) -> Option<Cow<'_, str>> {
        let (nested, flat) = match kind {
            EntityKind::Simulation => ("simulation", "simulationId"),
            EntityKind::Case => ("case", "caseId"),
            EntityKind::Organization => ("organization", "organizationId"),
        };

        self.get(nested)
            .and_then(|obj| obj.get("id"))
            .or_else(|| self.get(flat))
            .or_else(|| match kind {
                // Завершённая симуляция несёт дело внутри себя.
                EntityKind::Case => self.get("simulation").and_then(|s| s.get("caseId")),
                _ => None,
            })
            .and_then(json_id)
    }
}

fn json_id(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) if !s.is_empty() => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
