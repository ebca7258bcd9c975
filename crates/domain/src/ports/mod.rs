pub mod cache;
pub mod messaging;
pub mod observer;

pub use cache::LivenessCache;
pub use messaging::{MessageBus, MessageHandler};
pub use observer::DroneStatusObserver;
