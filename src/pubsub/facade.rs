//! Фасад публикации доменных событий.
//!
//! Единственное место, где имя события превращается в ключи топиков. И
//! издатели, и код, оформляющий подписки, строят ключи только здесь, поэтому
//! формат `EVENT_NAME` / `EVENT_NAME_{entityId}` не может разойтись.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    global_key, scoped_key, Dispatcher, EventName, EventPayload, PublishReport, Subscription,
    SubscriptionOptions, TopicKey,
};
use crate::SubscribeError;

/// Итог публикации одного логического события.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    pub event: EventName,
    /// По одному отчёту на каждый производный ключ, в порядке публикации.
    pub publishes: Vec<PublishReport>,
}

/// Издатель доменных событий поверх [`Dispatcher`].
pub struct EventPublisher<P> {
    dispatcher: Dispatcher<P>,
}

impl<P: EventPayload> EventPublisher<P> {
    pub fn new(dispatcher: Dispatcher<P>) -> Self {
        Self { dispatcher }
    }

    /// Диспетчер для «сырого» API.
    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    /// Публикует событие во все производные топики.
    ///
    /// Каждый ключ публикуется отдельно и независимо; payload разделяется
    /// между публикациями. Если payload не содержит id сущности, суженный
    /// ключ пропускается с предупреждением, а глобальный (если он есть)
    /// публикуется как обычно.
    pub fn publish_event(
        &self,
        event: EventName,
        payload: P,
    ) -> EventReport {
        let payload = Arc::new(payload);
        let publishes = self
            .topic_keys(event, &payload)
            .into_iter()
            .map(|key| self.dispatcher.publish_shared(key, Arc::clone(&payload)))
            .collect();

        EventReport { event, publishes }
    }

    /// Подписка на глобальный ключ события.
    pub fn subscribe_global(
        &self,
        event: EventName,
        options: SubscriptionOptions<P>,
    ) -> Result<Subscription<P>, SubscribeError> {
        if !event.has_global_key() {
            return Err(no_such_scope(event, "event has no global topic"));
        }
        self.dispatcher
            .subscribe_with_options([global_key(event)], options)
    }

    /// Подписка на ключ, суженный идентификатором сущности.
    pub fn subscribe_scoped(
        &self,
        event: EventName,
        entity_id: &str,
        options: SubscriptionOptions<P>,
    ) -> Result<Subscription<P>, SubscribeError> {
        if event.entity_kind().is_none() {
            return Err(no_such_scope(event, "event has no entity-scoped topic"));
        }
        self.dispatcher
            .subscribe_with_options([scoped_key(event, entity_id)?], options)
    }

    /// Подписка на событие целиком.
    ///
    /// Без id: глобальный ключ. С id: суженный ключ, а если у события есть
    /// и глобальный, то оба: по одной доставке на каждый ключ.
    pub fn subscribe_event(
        &self,
        event: EventName,
        entity_id: Option<&str>,
        options: SubscriptionOptions<P>,
    ) -> Result<Subscription<P>, SubscribeError> {
        match entity_id {
            None => self.subscribe_global(event, options),
            Some(_) if event.entity_kind().is_none() => {
                Err(no_such_scope(event, "event has no entity-scoped topic"))
            }
            Some(id) => {
                let mut keys = Vec::with_capacity(2);
                if event.has_global_key() {
                    keys.push(global_key(event));
                }
                keys.push(scoped_key(event, id)?);
                self.dispatcher.subscribe_with_options(keys, options)
            }
        }
    }

    /// Ключи, в которые уйдёт событие с данным payload.
    pub fn topic_keys(
        &self,
        event: EventName,
        payload: &P,
    ) -> Vec<TopicKey> {
        let mut keys = Vec::with_capacity(2);
        if event.has_global_key() {
            keys.push(global_key(event));
        }

        let Some(kind) = event.entity_kind() else {
            return keys;
        };
        match payload.entity_id(kind) {
            Some(id) => match scoped_key(event, &id) {
                Ok(key) => keys.push(key),
                Err(err) => warn!(%event, error = %err, "scoped topic skipped"),
            },
            None => warn!(
                %event,
                entity = ?kind,
                "payload carries no entity id, scoped topic skipped"
            ),
        }
        keys
    }
}

fn no_such_scope(
    event: EventName,
    reason: &str,
) -> SubscribeError {
    SubscribeError::InvalidTopic {
        topic: event.to_string(),
        reason: reason.to_string(),
    }
}

impl EventReport {
    /// Сумма доставок по всем ключам.
    pub fn delivered(&self) -> usize {
        self.publishes.iter().map(|r| r.delivered).sum()
    }

    pub fn topics(&self) -> impl Iterator<Item = &TopicKey> {
        self.publishes.iter().map(|r| &r.topic)
    }
}

impl<P> Clone for EventPublisher<P> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<P: EventPayload> From<Dispatcher<P>> for EventPublisher<P> {
    fn from(dispatcher: Dispatcher<P>) -> Self {
        Self::new(dispatcher)
    }
}

impl<P> std::fmt::Debug for EventPublisher<P> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
