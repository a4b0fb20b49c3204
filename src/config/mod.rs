pub mod settings;

pub use settings::{PubSubSettings, Settings};
