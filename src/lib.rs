/// Process settings: layered defaults, TOML file, environment.
pub mod config;
/// Root-crate error types: settings and logging.
pub mod error;
/// Logging (formats, filters, sinks).
pub mod logging;
/// Pub/Sub: topic keys, registry, subscriptions, dispatcher, facade.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Settings.
pub use self::config::{PubSubSettings, Settings};
/// Error types and the shared error infrastructure.
pub use error::{LoggingError, SettingsError};
/// Logging initialization.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    Dispatcher, DispatcherConfig, EventName, EventPayload, EventPublisher, Message,
    PublishReport, Subscription, SubscriptionId, SubscriptionOptions, TopicKey,
};
pub use reconbus_error::{
    ErrorExt, PredicateError, ReconbusResult, RecvError, StackError, StatusCode, SubscribeError,
    TryRecvError,
};

/// Версия, коммит и время сборки (заполняются `build.rs`).
pub mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
    pub const BUILD_TIME: &str = env!("BUILD_TIME");
}
