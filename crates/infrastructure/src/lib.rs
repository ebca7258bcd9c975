pub mod cache;
pub mod database;
pub mod in_memory_queue;
pub mod message_queue;
pub mod message_queue_factory;

pub use cache::RedisLivenessCache;
pub use database::postgres::{PostgresDroneRepository, PostgresOrderRepository};
pub use database::DatabaseManager;
pub use in_memory_queue::InMemoryMessageBus;
pub use message_queue::RabbitMQMessageBus;
pub use message_queue_factory::create_message_bus;
