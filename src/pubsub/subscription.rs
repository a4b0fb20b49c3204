use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures_util::{stream, Stream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::{
    dispatcher::Inner, evaluate_isolated, CallerContext, FilterContext, FilterPredicate, Listener,
    Message, SharedPredicate, TopicKey, Variables,
};
use crate::{PredicateError, RecvError, TryRecvError};

/// Идентификатор подписки, уникальный в пределах диспетчера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

/// Параметры создания подписки.
pub struct SubscriptionOptions<P> {
    /// Ёмкость буфера; `None`: ёмкость диспетчера по умолчанию.
    pub capacity: Option<usize>,
    pub variables: Variables,
    pub caller: CallerContext,
    pub filter: Option<SharedPredicate<P>>,
}

/// Счётчики одной подписки.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    /// Сообщения, помещённые в буфер
    pub delivered: u64,
    /// Сообщения, вытесненные при переполнении
    pub dropped: u64,
    /// Payload, отклонённые предикатом
    pub filtered: u64,
    /// Ошибки и паники предиката
    pub predicate_failures: u64,
    /// Сообщений в буфере сейчас
    pub buffered: usize,
    pub capacity: usize,
}

/// Подписка на один или несколько топиков.
///
/// Сообщения читаются через [`recv`](Self::recv), [`try_recv`](Self::try_recv)
/// или [`into_stream`](Self::into_stream) в порядке поступления.
///
/// Буфер ограничен. При переполнении вытесняется самое старое сообщение, а
/// следующее чтение один раз возвращает `Lagged { count }` с числом
/// вытесненных с прошлого чтения сообщений; дальше идут оставшиеся в буфере
/// сообщения.
///
/// Отписка происходит при [`cancel`](Self::cancel) или при `Drop`. После
/// отмены новые сообщения не поступают, уже буферизованные можно дочитать, а
/// затем чтение возвращает `Closed`.
pub struct Subscription<P> {
    pub(crate) shared: Arc<Shared<P>>,
    pub(crate) dispatcher: Arc<Inner<P>>,
}

/// Состояние подписки, разделяемое между держателем и диспетчером.
///
/// Реестр видит его через `Weak`.
pub(crate) struct Shared<P> {
    id: SubscriptionId,
    topics: Vec<TopicKey>,
    variables: Variables,
    caller: CallerContext,
    filter: Option<SharedPredicate<P>>,
    state: Mutex<BufferState<P>>,
    notify: Notify,
    delivered: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    predicate_failures: AtomicU64,
}

struct BufferState<P> {
    buffer: VecDeque<Message<P>>,
    capacity: usize,
    /// Вытеснено с прошлого чтения
    lagged: u64,
    closed: bool,
}

/// Итог помещения сообщения в буфер.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Доставлено, самое старое сообщение вытеснено.
    Overflowed,
    /// Подписка уже отменена, сообщение отброшено.
    Closed,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SubscriptionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl<P> SubscriptionOptions<P> {
    pub fn new() -> Self {
        Self {
            capacity: None,
            variables: Variables::new(),
            caller: CallerContext::default(),
            filter: None,
        }
    }

    pub fn capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn variables(
        mut self,
        variables: Variables,
    ) -> Self {
        self.variables = variables;
        self
    }

    /// Добавляет одну переменную подписки.
    pub fn variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn caller(
        mut self,
        caller: CallerContext,
    ) -> Self {
        self.caller = caller;
        self
    }

    pub fn filter(
        mut self,
        predicate: impl FilterPredicate<P> + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }

    pub fn shared_filter(
        mut self,
        predicate: SharedPredicate<P>,
    ) -> Self {
        self.filter = Some(predicate);
        self
    }
}

impl<P> Subscription<P>
where
    P: Send + Sync + 'static,
{
    /// Асинхронно ожидает следующее сообщение.
    ///
    /// # Возвращает
    /// - `Ok(Message)` при успешном получении сообщения
    /// - `Err(RecvError::Lagged { count })` один раз после переполнения буфера
    /// - `Err(RecvError::Closed)` если подписка отменена и буфер вычитан
    pub async fn recv(&mut self) -> Result<Message<P>, RecvError> {
        loop {
            // Future создаётся до проверки буфера: `notify_one` между
            // проверкой и ожиданием не теряется.
            let notified = self.shared.notify.notified();
            match self.shared.try_recv() {
                Ok(msg) => return Ok(msg),
                Err(TryRecvError::Lagged { count }) => return Err(RecvError::Lagged { count }),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
                Err(TryRecvError::Empty) => notified.await,
            }
        }
    }

    /// Пытается получить сообщение без ожидания.
    pub fn try_recv(&mut self) -> Result<Message<P>, TryRecvError> {
        self.shared.try_recv()
    }

    /// Превращает подписку в `Stream`.
    ///
    /// Поток заканчивается, когда подписка отменена и буфер вычитан.
    /// `Lagged` передаётся элементом потока. Drop потока отменяет подписку.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message<P>, RecvError>> + Send {
        stream::unfold(self, |mut sub| async move {
            match sub.recv().await {
                Err(RecvError::Closed) => None,
                item => Some((item, sub)),
            }
        })
    }

    /// Отменяет подписку.
    ///
    /// Идемпотентно. После возврата подписка снята со всех топиков и ни одна
    /// публикация, в том числе уже идущая, в неё больше не доставит.
    /// Возвращает `true`, если этот вызов выполнил отмену.
    pub fn cancel(&self) -> bool {
        self.dispatcher.detach(&self.shared)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    pub fn topics(&self) -> &[TopicKey] {
        &self.shared.topics
    }

    pub fn variables(&self) -> &Variables {
        &self.shared.variables
    }

    pub fn caller(&self) -> &CallerContext {
        &self.shared.caller
    }

    /// Количество сообщений в буфере.
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.shared.stats()
    }
}

impl<P> Shared<P> {
    pub(crate) fn new(
        id: SubscriptionId,
        topics: Vec<TopicKey>,
        capacity: usize,
        options: SubscriptionOptions<P>,
    ) -> Self {
        Self {
            id,
            topics,
            variables: options.variables,
            caller: options.caller,
            filter: options.filter,
            state: Mutex::new(BufferState {
                buffer: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                lagged: 0,
                closed: false,
            }),
            notify: Notify::new(),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            predicate_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn topics(&self) -> &[TopicKey] {
        &self.topics
    }

    /// Решение предиката для payload. Без предиката всё принимается.
    pub(crate) fn accepts(
        &self,
        payload: &P,
        topic: &TopicKey,
    ) -> Result<bool, PredicateError> {
        let Some(filter) = self.filter.as_deref() else {
            return Ok(true);
        };
        let ctx = FilterContext {
            subscription_id: self.id,
            topic,
            variables: &self.variables,
            caller: &self.caller,
        };
        let result = evaluate_isolated(filter, payload, &ctx);
        match &result {
            Ok(false) => {
                self.filtered.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.predicate_failures.fetch_add(1, Ordering::Relaxed);
            }
            Ok(true) => {}
        }
        result
    }

    /// Помещает сообщение в буфер, вытесняя самое старое при переполнении.
    pub(crate) fn deliver(
        &self,
        msg: Message<P>,
    ) -> Delivery {
        let mut state = self.state.lock();
        // Проверка под тем же локом, что и в `close`: после возврата из
        // `cancel` сюда ничего не попадёт.
        if state.closed {
            return Delivery::Closed;
        }

        let overflowed = if state.buffer.len() >= state.capacity {
            state.buffer.pop_front();
            state.lagged += 1;
            true
        } else {
            false
        };
        state.buffer.push_back(msg);
        // Счётчики меняются под локом, чтобы `stats` после `cancel` не росла.
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        drop(state);

        self.notify.notify_one();
        if overflowed {
            Delivery::Overflowed
        } else {
            Delivery::Delivered
        }
    }

    /// Закрывает подписку. `true`, если она была открыта.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);

        // Будим читателя, ждущего в `recv`.
        self.notify.notify_one();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn try_recv(&self) -> Result<Message<P>, TryRecvError> {
        let mut state = self.state.lock();
        if state.lagged > 0 {
            let count = std::mem::take(&mut state.lagged);
            return Err(TryRecvError::Lagged { count });
        }
        match state.buffer.pop_front() {
            Some(msg) => Ok(msg),
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    fn stats(&self) -> SubscriptionStats {
        let (buffered, capacity) = {
            let state = self.state.lock();
            (state.buffer.len(), state.capacity)
        };
        SubscriptionStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            predicate_failures: self.predicate_failures.load(Ordering::Relaxed),
            buffered,
            capacity,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl<P> Default for SubscriptionOptions<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for SubscriptionOptions<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionOptions")
            .field("capacity", &self.capacity)
            .field("variables", &self.variables)
            .field("caller", &self.caller)
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl<P> Listener for Shared<P> {
    fn listener_id(&self) -> SubscriptionId {
        self.id
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("topics", &self.shared.topics)
            .field("cancelled", &self.shared.is_closed())
            .finish()
    }
}

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        self.dispatcher.detach(&self.shared);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::pubsub::Dispatcher;

    fn dispatcher() -> Dispatcher<u32> {
        Dispatcher::default()
    }

    /// Тест проверяет порядок чтения и `try_recv` на пустом буфере.
    #[tokio::test]
    async fn test_recv_in_publish_order() {
        let d = dispatcher();
        let mut sub = d.subscribe(["T"]).unwrap();
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Empty);

        for i in 0..5 {
            d.publish("T", i);
        }
        assert_eq!(sub.len(), 5);
        for i in 0..5 {
            assert_eq!(*sub.recv().await.unwrap().payload(), i);
        }
        assert!(sub.is_empty());
    }

    /// Тест проверяет, что `recv` просыпается на публикацию из другой задачи.
    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let d = dispatcher();
        let mut sub = d.subscribe(["T"]).unwrap();

        let publisher = d.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish("T", 7);
        });

        let msg = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("recv timed out")
            .unwrap();
        assert_eq!(*msg.payload(), 7);
        task.await.unwrap();
    }

    /// Тест проверяет политику переполнения: `Lagged` ровно один раз, затем
    /// N самых новых сообщений.
    #[tokio::test]
    async fn test_overflow_reports_lag_once() {
        let d = dispatcher();
        let mut sub = d
            .subscribe_with_options(["T"], SubscriptionOptions::new().capacity(4))
            .unwrap();

        for i in 0..9 {
            d.publish("T", i);
        }

        assert_eq!(sub.recv().await.unwrap_err(), RecvError::Lagged { count: 5 });
        let rest: Vec<u32> = (0..4)
            .map(|_| *sub.try_recv().unwrap().payload())
            .collect();
        assert_eq!(rest, vec![5, 6, 7, 8]);
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Empty);

        let stats = sub.stats();
        assert_eq!(stats.delivered, 9);
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.capacity, 4);
    }

    /// Тест проверяет, что буферизованные до отмены сообщения дочитываются,
    /// а затем приходит `Closed`.
    #[tokio::test]
    async fn test_cancel_drains_then_closed() {
        let d = dispatcher();
        let mut sub = d.subscribe(["T"]).unwrap();
        d.publish("T", 1);

        assert!(sub.cancel());
        assert!(!sub.cancel());
        assert!(sub.is_cancelled());

        d.publish("T", 2);
        assert_eq!(*sub.recv().await.unwrap().payload(), 1);
        assert_eq!(sub.recv().await.unwrap_err(), RecvError::Closed);
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Closed);
    }

    /// Тест проверяет, что отмена будит ожидающего читателя.
    #[tokio::test]
    async fn test_cancel_wakes_pending_recv() {
        let d = dispatcher();
        let mut sub = d.subscribe(["T"]).unwrap();
        let id = sub.id();

        let reader = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(d.cancel(id));

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader was not woken")
            .unwrap();
        assert_eq!(result.unwrap_err(), RecvError::Closed);
    }

    /// Тест проверяет поток: элементы в порядке, конец после отмены.
    #[tokio::test]
    async fn test_into_stream_ends_on_cancel() {
        let d = dispatcher();
        let sub = d.subscribe(["T"]).unwrap();
        let id = sub.id();
        for i in 0..3 {
            d.publish("T", i);
        }
        d.cancel(id);

        let items: Vec<u32> = sub
            .into_stream()
            .map(|r| *r.unwrap().payload())
            .collect()
            .await;
        assert_eq!(items, vec![0, 1, 2]);
    }

    /// Тест проверяет, что `Drop` снимает подписку с топиков.
    #[test]
    fn test_drop_unregisters() {
        let d = dispatcher();
        let sub = d.subscribe(["A", "B"]).unwrap();
        assert_eq!(d.subscription_count(), 1);
        assert_eq!(d.topic_count(), 2);

        drop(sub);
        assert_eq!(d.subscription_count(), 0);
        assert_eq!(d.topic_count(), 0);
    }

    /// Тест проверяет builder опций и доступ к контексту подписки.
    #[test]
    fn test_options_builder() {
        let d = dispatcher();
        let sub = d
            .subscribe_with_options(
                ["T"],
                SubscriptionOptions::new()
                    .capacity(8)
                    .variable("caseId", "C1")
                    .caller(CallerContext {
                        user_id: Some("u-1".into()),
                        ..Default::default()
                    }),
            )
            .unwrap();

        assert_eq!(sub.capacity(), 8);
        assert_eq!(sub.variables()["caseId"], "C1");
        assert_eq!(sub.caller().user_id.as_deref(), Some("u-1"));
        assert_eq!(sub.topics(), &[TopicKey::from("T")]);
        assert_eq!(sub.id().to_string(), format!("sub-{}", sub.id().get()));
    }
}
