pub mod app_config;
pub mod cache;
pub mod database;
pub mod dispatcher;
pub mod logging;
pub mod message_queue;

pub use app_config::AppConfig;
pub use cache::CacheConfig;
pub use database::DatabaseConfig;
pub use dispatcher::DispatcherConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use message_queue::{MessageQueueConfig, MessageQueueType};
