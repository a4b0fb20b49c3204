//! Контракт предикатов фильтрации подписок.
//!
//! Предикат вызывается диспетчером синхронно для каждого payload, который
//! вот-вот будет доставлен подписке. Ошибка или паника предиката изолирована
//! этой подпиской: остальные подписчики топика получают payload как обычно,
//! а сама подписка не отменяется.

use std::{
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityKind, EventPayload, SubscriptionId, TopicKey};
use crate::PredicateError;

/// Переменные подписки (аргументы GraphQL-подписки).
pub type Variables = Map<String, Value>;

/// Кто подписался. Захватывается в момент подписки.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Всё, что предикат знает о подписке в момент вычисления.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub subscription_id: SubscriptionId,
    pub topic: &'a TopicKey,
    pub variables: &'a Variables,
    pub caller: &'a CallerContext,
}

/// Предикат фильтрации: принять (`true`) или отклонить (`false`) payload.
pub trait FilterPredicate<P>: Send + Sync {
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError>;
}

impl<P, F> FilterPredicate<P> for F
where
    F: Fn(&P, &FilterContext<'_>) -> Result<bool, PredicateError> + Send + Sync,
{
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError> {
        self(payload, ctx)
    }
}

/// Разделяемый предикат в том виде, в котором его хранит подписка.
pub type SharedPredicate<P> = Arc<dyn FilterPredicate<P>>;

/// Оборачивает безошибочное замыкание в предикат.
pub fn predicate_fn<P, F>(f: F) -> SharedPredicate<P>
where
    P: 'static,
    F: Fn(&P, &FilterContext<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(move |payload: &P, ctx: &FilterContext<'_>| {
        Ok::<bool, PredicateError>(f(payload, ctx))
    })
}

/// Вычисляет предикат, превращая панику в [`PredicateError::Panicked`].
pub(crate) fn evaluate_isolated<P>(
    predicate: &dyn FilterPredicate<P>,
    payload: &P,
    ctx: &FilterContext<'_>,
) -> Result<bool, PredicateError> {
    match catch_unwind(AssertUnwindSafe(|| predicate.evaluate(payload, ctx))) {
        Ok(result) => result,
        Err(panic) => Err(PredicateError::from_panic(panic)),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Встроенные предикаты
////////////////////////////////////////////////////////////////////////////////

/// Принимает payload, если id сущности совпадает с переменной подписки.
///
/// Например `caseId == variables["caseId"]` для `SIMULATION_COMPLETED`.
/// Если id нет в payload или переменная не задана, payload отклоняется.
#[derive(Debug, Clone)]
pub struct EntityMatchesVariable {
    pub kind: EntityKind,
    pub variable: String,
}

impl EntityMatchesVariable {
    pub fn new(
        kind: EntityKind,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            variable: variable.into(),
        }
    }
}

impl<P: EventPayload> FilterPredicate<P> for EntityMatchesVariable {
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError> {
        let expected = match ctx.variables.get(&self.variable) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => return Ok(false),
            Some(other) => {
                return Err(PredicateError::rejected(format!(
                    "variable '{}' must be a string or number, got {other}",
                    self.variable
                )))
            }
        };
        Ok(payload
            .entity_id(self.kind)
            .is_some_and(|actual| actual == expected.as_str()))
    }
}

/// Принимает payload, если его организация совпадает с организацией
/// вызывающего.
///
/// Эталонное правило авторизации; по умолчанию нигде не устанавливается.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameOrganization;

impl<P: EventPayload> FilterPredicate<P> for SameOrganization {
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError> {
        let Some(caller_org) = ctx.caller.organization_id.as_deref() else {
            return Ok(false);
        };
        Ok(payload
            .entity_id(EntityKind::Organization)
            .is_some_and(|org| org == caller_org))
    }
}

/// Все предикаты должны принять payload. Первая ошибка прерывает вычисление.
pub struct AllOf<P>(pub Vec<SharedPredicate<P>>);

/// Хотя бы один предикат должен принять payload.
pub struct AnyOf<P>(pub Vec<SharedPredicate<P>>);

impl<P> FilterPredicate<P> for AllOf<P> {
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError> {
        for predicate in &self.0 {
            if !predicate.evaluate(payload, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<P> FilterPredicate<P> for AnyOf<P> {
    fn evaluate(
        &self,
        payload: &P,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, PredicateError> {
        for predicate in &self.0 {
            if predicate.evaluate(payload, ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<P> fmt::Debug for AllOf<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "AllOf({} predicates)", self.0.len())
    }
}

impl<P> fmt::Debug for AnyOf<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "AnyOf({} predicates)", self.0.len())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
