use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Счётчики диспетчера.
///
/// Все поля обновляются с `Ordering::Relaxed`: это статистика, а не
/// синхронизация.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Общее количество вызовов `publish`
    pub publishes: AtomicU64,
    /// Публикации в топик без единого слушателя
    pub publishes_without_listeners: AtomicU64,
    /// Сообщения, помещённые в буферы подписок
    pub deliveries: AtomicU64,
    /// Payload, отклонённые предикатами
    pub filtered: AtomicU64,
    /// Ошибки и паники предикатов
    pub predicate_failures: AtomicU64,
    /// Сообщения, вытесненные из переполненных буферов
    pub overflow_drops: AtomicU64,
    pub subscriptions_opened: AtomicU64,
    pub subscriptions_cancelled: AtomicU64,
}

/// Снимок [`DispatchStats`] в один момент времени.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStatsSnapshot {
    pub publishes: u64,
    pub publishes_without_listeners: u64,
    pub deliveries: u64,
    pub filtered: u64,
    pub predicate_failures: u64,
    pub overflow_drops: u64,
    pub subscriptions_opened: u64,
    pub subscriptions_cancelled: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            publishes: self.publishes.load(Ordering::Relaxed),
            publishes_without_listeners: self.publishes_without_listeners.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            predicate_failures: self.predicate_failures.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            subscriptions_opened: self.subscriptions_opened.load(Ordering::Relaxed),
            subscriptions_cancelled: self.subscriptions_cancelled.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(
        counter: &AtomicU64,
        n: usize,
    ) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
}

impl DispatchStatsSnapshot {
    /// Количество подписок, открытых и ещё не отменённых.
    pub fn active_subscriptions(&self) -> u64 {
        self.subscriptions_opened
            .saturating_sub(self.subscriptions_cancelled)
    }
}
