pub mod postgres_drone_repository;
pub mod postgres_order_repository;

pub use postgres_drone_repository::PostgresDroneRepository;
pub use postgres_order_repository::PostgresOrderRepository;
