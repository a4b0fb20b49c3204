//! Подсистема Publish–Subscribe (pub/sub) по топикам.
//!
//! Долгие вычисления (симуляции, изменения дел) публикуют события жизненного
//! цикла, а множество независимых подписок получает только относящиеся к ним
//! события, по порядку и без перекрёстных доставок.
//!
//! - `topic`: ключи топиков, имена событий и правила построения ключей.
//! - `events`: доменные payload и извлечение id сущностей.
//! - `filter`: контракт предикатов фильтрации и встроенные предикаты.
//! - `registry`: реестр топик → слушатели.
//! - `subscription`: подписка с ограниченным буфером и отменой.
//! - `dispatcher`: fan-out публикаций с изоляцией предикатов.
//! - `facade`: публикация логического события в производные топики.
//! - `stats`: счётчики диспетчера.

pub mod dispatcher;
pub mod events;
pub mod facade;
pub mod filter;
pub mod message;
pub mod registry;
pub mod stats;
pub mod subscription;
pub mod topic;

// Публичный экспорт всех типов и функций из вложенных модулей, чтобы
// упростить доступ к ним из внешнего кода.
pub use dispatcher::{
    Dispatcher, DispatcherConfig, PublishReport, DEFAULT_CAPACITY, MAX_CAPACITY,
};
pub use events::*;
pub use facade::*;
pub(crate) use filter::evaluate_isolated;
pub use filter::{
    predicate_fn, AllOf, AnyOf, CallerContext, EntityMatchesVariable, FilterContext,
    FilterPredicate, SameOrganization, SharedPredicate, Variables,
};
pub use message::*;
pub use registry::{Listener, TopicRegistry};
pub use stats::*;
pub use subscription::{Subscription, SubscriptionId, SubscriptionOptions, SubscriptionStats};
pub use topic::*;
