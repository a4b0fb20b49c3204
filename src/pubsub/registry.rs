use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{SubscriptionId, TopicKey};

/// Участник реестра. Реестр знает о подписке только её идентификатор.
pub trait Listener {
    fn listener_id(&self) -> SubscriptionId;
}

/// Реестр топиков.
///
/// Чистая бухгалтерия: топик → упорядоченный список слушателей. Payload
/// никогда не просматривается.
///
/// - Шардированная карта (`DashMap`): регистрация на разных топиках не
///   конкурирует за общий лок.
/// - У каждого топика свой `RwLock` списка слушателей, который держится только
///   на время снимка.
/// - У каждого топика свой мьютекс рассылки. Он держится только на время
///   раскладки уже отфильтрованного сообщения по буферам, поэтому все
///   подписчики топика видят один порядок, а предикаты под ним не работают.
/// - Реестр хранит `Weak`: членство, но не владение. Отменённая или
///   брошенная подписка не удерживается публикацией.
///
/// Подписка, снятая во время публикации, может попасть в уже сделанный снимок.
/// Отказ в доставке после возврата из `cancel` обеспечивает сама
/// подписка (флаг закрытия под её собственным локом), а не реестр.
pub struct TopicRegistry<L> {
    topics: DashMap<TopicKey, Arc<TopicSlot<L>>>,
}

struct TopicSlot<L> {
    listeners: RwLock<Vec<ListenerRef<L>>>,
    dispatch: Mutex<()>,
}

/// Снимок слушателей одного топика вместе с его мьютексом рассылки.
pub(crate) struct DispatchSnapshot<L> {
    slot: Arc<TopicSlot<L>>,
    listeners: Vec<Arc<L>>,
}

struct ListenerRef<L> {
    id: SubscriptionId,
    listener: Weak<L>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<L: Listener> TopicRegistry<L> {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Регистрирует слушателя на топике.
    ///
    /// Идемпотентно: повторная регистрация той же пары ничего не делает и
    /// возвращает `false`.
    pub fn register(
        &self,
        topic: &TopicKey,
        listener: &Arc<L>,
    ) -> bool {
        let id = listener.listener_id();
        // Запись держит лок шарда, пока слушатель не добавлен: `remove_if` в
        // `unregister` не удалит слот между созданием и вставкой.
        let slot = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(TopicSlot::new()));
        let mut listeners = slot.listeners.write();
        if listeners.iter().any(|l| l.id == id) {
            return false;
        }
        listeners.push(ListenerRef {
            id,
            listener: Arc::downgrade(listener),
        });
        true
    }

    /// Снимает слушателя с топика.
    ///
    /// Для отсутствующего слушателя возвращается `false`.
    /// Мёртвые `Weak` этого топика вычищаются попутно; опустевший топик
    /// удаляется.
    pub fn unregister(
        &self,
        topic: &str,
        id: SubscriptionId,
    ) -> bool {
        let (removed, now_empty) = match self.topics.get(topic) {
            Some(slot) => {
                let mut listeners = slot.listeners.write();
                let present = listeners.iter().any(|l| l.id == id);
                listeners.retain(|l| l.id != id && l.listener.strong_count() > 0);
                (present, listeners.is_empty())
            }
            None => return false,
        };

        if now_empty {
            // Повторная проверка под локом шарда: параллельный `register` мог
            // успеть добавить слушателя.
            self.topics
                .remove_if(topic, |_, slot| slot.listeners.read().is_empty());
        }

        removed
    }

    /// Живые слушатели топика в порядке регистрации (снимок).
    pub fn listeners_of(
        &self,
        topic: &str,
    ) -> Vec<Arc<L>> {
        match self.slot(topic) {
            Some(slot) => slot.snapshot(),
            None => Vec::new(),
        }
    }

    /// Снимок слушателей топика для рассылки. `None`, если слушателей нет.
    ///
    /// Ни один лок не удерживается после возврата: предикаты вычисляются над
    /// снимком свободно, а упорядоченная часть рассылки идёт через
    /// [`DispatchSnapshot::in_order`].
    pub(crate) fn snapshot(
        &self,
        topic: &str,
    ) -> Option<DispatchSnapshot<L>> {
        let slot = self.slot(topic)?;
        let listeners = slot.snapshot();
        if listeners.is_empty() {
            return None;
        }
        Some(DispatchSnapshot { slot, listeners })
    }

    pub fn listener_count(
        &self,
        topic: &str,
    ) -> usize {
        self.slot(topic)
            .map(|slot| {
                slot.listeners
                    .read()
                    .iter()
                    .filter(|l| l.listener.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Количество топиков, у которых есть хотя бы одна запись.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn topics(&self) -> Vec<TopicKey> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    fn slot(
        &self,
        topic: &str,
    ) -> Option<Arc<TopicSlot<L>>> {
        // Клонируем Arc и сразу отпускаем лок шарда.
        self.topics.get(topic).map(|slot| Arc::clone(slot.value()))
    }
}

impl<L> TopicSlot<L> {
    fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            dispatch: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners
            .read()
            .iter()
            .filter_map(|l| l.listener.upgrade())
            .collect()
    }
}

impl<L> DispatchSnapshot<L> {
    pub(crate) fn listeners(&self) -> &[Arc<L>] {
        &self.listeners
    }

    /// Выполняет `f` под мьютексом рассылки топика.
    ///
    /// `f` должна быть короткой и не вызывать пользовательский код: мьютекс
    /// не реентерабелен и общий для всех издателей топика.
    pub(crate) fn in_order<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> R {
        let _order = self.slot.dispatch.lock();
        f()
    }
}

impl<L: Listener> Default for TopicRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
