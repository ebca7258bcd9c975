use async_trait::async_trait;
use uuid::Uuid;

use crate::{entities::DroneStatus, value_objects::Position};

/// 无人机状态变更观察者
///
/// 在状态变更调用内同步执行，按注册顺序依次调用。观察者自行处理失败，不能影响触发它的状态变更。
#[async_trait]
pub trait DroneStatusObserver: Send + Sync {
    async fn on_status_changed(
        &self,
        drone_id: Uuid,
        old_status: DroneStatus,
        new_status: DroneStatus,
        last_position: Position,
    );
}
