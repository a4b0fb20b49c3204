use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{
    subscription::{Delivery, Shared},
    DispatchStats, DispatchStatsSnapshot, Message, Subscription, SubscriptionId,
    SubscriptionOptions, TopicKey, TopicRegistry,
};
use crate::SubscribeError;

/// Ёмкость буфера подписки по умолчанию.
pub const DEFAULT_CAPACITY: usize = 256;
/// Верхняя граница ёмкости буфера подписки.
pub const MAX_CAPACITY: usize = 65_536;

/// Параметры диспетчера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Ёмкость буфера подписки, если она не указана явно
    pub default_capacity: usize,
    /// Максимально допустимая ёмкость буфера подписки
    pub max_capacity: usize,
}

/// Итог одного вызова `publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub topic: TopicKey,
    /// Номер публикации, записанный в каждое доставленное сообщение
    pub sequence: u64,
    /// Слушателей в снимке топика. Всегда равно сумме `delivered`,
    /// `filtered`, `failed` и `skipped_closed`.
    pub matched: usize,
    /// Помещено в буферы (включая доставки с вытеснением)
    pub delivered: usize,
    /// Отклонено предикатами
    pub filtered: usize,
    /// Ошибки и паники предикатов
    pub failed: usize,
    /// Доставки, вытеснившие самое старое сообщение
    pub overflowed: usize,
    /// Подписки из снимка, отменённые до доставки
    pub skipped_closed: usize,
}

/// Диспетчер публикаций.
///
/// Явно создаваемый объект: никакого глобального экземпляра. Клонирование
/// дешёвое, клоны разделяют реестр, счётчики и нумерацию.
///
/// `publish` никогда не блокируется на медленном подписчике и не возвращает
/// ошибок. Публикация в топик без слушателей ничего не делает, сбой предиката
/// изолирован подпиской и попадает в лог и счётчики.
pub struct Dispatcher<P> {
    inner: Arc<Inner<P>>,
}

pub(crate) struct Inner<P> {
    registry: TopicRegistry<Shared<P>>,
    config: DispatcherConfig,
    next_id: AtomicU64,
    sequence: AtomicU64,
    /// Открытые подписки: для `cancel` по идентификатору.
    live: DashMap<SubscriptionId, Weak<Shared<P>>>,
    stats: DispatchStats,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<P> Dispatcher<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: TopicRegistry::new(),
                config,
                next_id: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
                live: DashMap::new(),
                stats: DispatchStats::default(),
            }),
        }
    }

    /// Подписка без предиката с ёмкостью по умолчанию.
    pub fn subscribe<I, T>(
        &self,
        topics: I,
    ) -> Result<Subscription<P>, SubscribeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TopicKey>,
    {
        self.subscribe_with_options(topics, SubscriptionOptions::new())
    }

    /// Создаёт подписку и регистрирует её на всех топиках.
    ///
    /// Повторяющиеся топики схлопываются с сохранением порядка первого
    /// появления.
    ///
    /// # Ошибки
    /// - `EmptyTopicSet`, если топиков нет
    /// - `InvalidTopic`, если ключ топика пустой
    /// - `InvalidCapacity`, если ёмкость равна нулю или больше `max_capacity`
    pub fn subscribe_with_options<I, T>(
        &self,
        topics: I,
        options: SubscriptionOptions<P>,
    ) -> Result<Subscription<P>, SubscribeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<TopicKey>,
    {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if topic.as_str().is_empty() {
                return Err(SubscribeError::InvalidTopic {
                    topic: String::new(),
                    reason: "topic key must not be empty".to_string(),
                });
            }
            if seen.insert(topic.clone()) {
                keys.push(topic);
            }
        }
        if keys.is_empty() {
            return Err(SubscribeError::EmptyTopicSet);
        }

        let max = self.inner.config.max_capacity;
        let capacity = options
            .capacity
            .unwrap_or(self.inner.config.default_capacity);
        if capacity == 0 || capacity > max {
            return Err(SubscribeError::InvalidCapacity {
                requested: capacity,
                max,
            });
        }

        let id = SubscriptionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let shared = Arc::new(Shared::new(id, keys, capacity, options));

        self.inner.live.insert(id, Arc::downgrade(&shared));
        for topic in shared.topics() {
            self.inner.registry.register(topic, &shared);
        }
        self.inner
            .stats
            .subscriptions_opened
            .fetch_add(1, Ordering::Relaxed);

        debug!(
            subscription_id = %id,
            topics = ?shared.topics(),
            capacity,
            "subscription registered"
        );

        Ok(Subscription {
            shared,
            dispatcher: Arc::clone(&self.inner),
        })
    }

    /// Публикует payload в топик.
    pub fn publish(
        &self,
        topic: impl Into<TopicKey>,
        payload: P,
    ) -> PublishReport {
        self.publish_shared(topic, Arc::new(payload))
    }

    /// Публикует уже разделяемый payload: одна логическая публикация в
    /// несколько топиков не копирует его.
    ///
    /// Предикаты вычисляются над снимком слушателей без каких-либо локов:
    /// медленный предикат не задерживает других издателей, а предикат может
    /// сам публиковать, в том числе в этот же топик. Под мьютексом рассылки
    /// топика выполняются только выдача номера и раскладка по буферам
    /// принявших подписок, поэтому все подписчики топика видят публикации в
    /// одном порядке.
    pub fn publish_shared(
        &self,
        topic: impl Into<TopicKey>,
        payload: Arc<P>,
    ) -> PublishReport {
        let topic = topic.into();
        let stats = &self.inner.stats;
        stats.publishes.fetch_add(1, Ordering::Relaxed);

        let Some(snapshot) = self.inner.registry.snapshot(topic.as_str()) else {
            stats
                .publishes_without_listeners
                .fetch_add(1, Ordering::Relaxed);
            return PublishReport::new(topic, self.next_sequence());
        };

        let listeners = snapshot.listeners();
        let mut report = PublishReport::new(topic.clone(), 0);
        report.matched = listeners.len();

        let mut accepted = Vec::with_capacity(listeners.len());
        for listener in listeners {
            if listener.is_closed() {
                report.skipped_closed += 1;
                continue;
            }
            match listener.accepts(&payload, &topic) {
                Ok(true) => accepted.push(listener),
                Ok(false) => report.filtered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        subscription_id = %listener.id(),
                        topic = %topic,
                        error = %err,
                        "filter predicate failed, payload skipped for this subscription"
                    );
                }
            }
        }

        let outcomes = snapshot.in_order(|| {
            // Номер берётся под мьютексом рассылки: внутри топика порядок
            // номеров совпадает с порядком доставки.
            let sequence = self.next_sequence();
            let outcomes: Vec<Delivery> = accepted
                .iter()
                .map(|listener| {
                    listener.deliver(Message::new(topic.clone(), sequence, Arc::clone(&payload)))
                })
                .collect();
            (sequence, outcomes)
        });
        report.sequence = outcomes.0;

        for (listener, outcome) in accepted.iter().zip(outcomes.1) {
            match outcome {
                Delivery::Delivered => {
                    report.delivered += 1;
                    trace!(
                        subscription_id = %listener.id(),
                        topic = %topic,
                        sequence = report.sequence,
                        "delivered"
                    );
                }
                Delivery::Overflowed => {
                    report.delivered += 1;
                    report.overflowed += 1;
                    debug!(
                        subscription_id = %listener.id(),
                        topic = %topic,
                        dropped = 1,
                        "subscription buffer full, oldest message dropped"
                    );
                }
                // Отменена между снимком и доставкой.
                Delivery::Closed => report.skipped_closed += 1,
            }
        }

        DispatchStats::add(&stats.deliveries, report.delivered);
        DispatchStats::add(&stats.filtered, report.filtered);
        DispatchStats::add(&stats.predicate_failures, report.failed);
        DispatchStats::add(&stats.overflow_drops, report.overflowed);

        report
    }

    /// Отменяет подписку по идентификатору.
    ///
    /// Для неизвестного или уже отменённого идентификатора возвращается
    /// `false`.
    pub fn cancel(
        &self,
        id: SubscriptionId,
    ) -> bool {
        let shared = self
            .inner
            .live
            .get(&id)
            .and_then(|entry| entry.value().upgrade());
        match shared {
            Some(shared) => self.inner.detach(&shared),
            None => false,
        }
    }

    /// Количество открытых подписок.
    pub fn subscription_count(&self) -> usize {
        self.inner.live.len()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.registry.topic_count()
    }

    pub fn listener_count(
        &self,
        topic: &str,
    ) -> usize {
        self.inner.registry.listener_count(topic)
    }

    pub fn topics(&self) -> Vec<TopicKey> {
        self.inner.registry.topics()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.inner.stats.snapshot()
    }

    fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<P> Inner<P> {
    /// Закрывает подписку и снимает её со всех топиков.
    ///
    /// Флаг закрытия ставится первым, под локом буфера подписки: любая
    /// доставка, начавшаяся позже, увидит его и ничего не положит.
    pub(crate) fn detach(
        &self,
        shared: &Arc<Shared<P>>,
    ) -> bool {
        if !shared.close() {
            return false;
        }
        for topic in shared.topics() {
            self.registry.unregister(topic.as_str(), shared.id());
        }
        self.live.remove(&shared.id());
        self.stats
            .subscriptions_cancelled
            .fetch_add(1, Ordering::Relaxed);

        debug!(subscription_id = %shared.id(), "subscription cancelled");
        true
    }
}

impl PublishReport {
    fn new(
        topic: TopicKey,
        sequence: u64,
    ) -> Self {
        Self {
            topic,
            sequence,
            matched: 0,
            delivered: 0,
            filtered: 0,
            failed: 0,
            overflowed: 0,
            skipped_closed: 0,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            max_capacity: MAX_CAPACITY,
        }
    }
}

impl<P> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for Dispatcher<P>
where
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl<P> std::fmt::Debug for Dispatcher<P> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("subscriptions", &self.inner.live.len())
            .field("topics", &self.inner.registry.topic_count())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
