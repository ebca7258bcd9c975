pub mod dispatcher_service;
pub mod drone_service;
pub mod heartbeat_monitor;
pub mod order_service;
pub mod order_worker;
pub mod recovery_handler;

pub use dispatcher_service::DispatcherService;
pub use drone_service::{DroneService, DroneServiceConfig};
pub use heartbeat_monitor::{HeartbeatMonitor, HeartbeatMonitorConfig, HeartbeatScanReport};
pub use order_service::OrderService;
pub use order_worker::OrderDispatchWorker;
pub use recovery_handler::RecoveryHandler;
