use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::DispatchResult;
use uuid::Uuid;

use crate::value_objects::Position;

/// 无人机存活缓存
///
/// 心跳标记和最新位置都带TTL，位置更新时刷新。标记缺失即视为无响应。
#[async_trait]
pub trait LivenessCache: Send + Sync {
    async fn set_heartbeat(&self, drone_id: Uuid, ttl: Duration) -> DispatchResult<()>;
    async fn has_heartbeat(&self, drone_id: Uuid) -> DispatchResult<bool>;
    async fn set_position(
        &self,
        drone_id: Uuid,
        position: Position,
        ttl: Duration,
    ) -> DispatchResult<()>;
    async fn get_position(&self, drone_id: Uuid) -> DispatchResult<Option<Position>>;
}

pub fn heartbeat_key(drone_id: Uuid) -> String {
    format!("drone:{drone_id}:heartbeat")
}

pub fn location_key(drone_id: Uuid) -> String {
    format!("drone:{drone_id}:location")
}
