use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{
    Drone, DroneRepository, DroneStatus, DroneStatusObserver, LivenessCache, Position,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 无人机服务配置
#[derive(Debug, Clone)]
pub struct DroneServiceConfig {
    /// 心跳标记TTL
    pub heartbeat_ttl: Duration,
    /// 位置缓存TTL
    pub location_ttl: Duration,
}

impl Default for DroneServiceConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl: Duration::from_secs(30),
            location_ttl: Duration::from_secs(60),
        }
    }
}

/// 无人机服务
///
/// 所有状态变更都经过 `update_status`，它在持久化之后按注册顺序同步通知观察者。
/// 观察者列表在构造时确定，运行期间不增删。
pub struct DroneService {
    drone_repo: Arc<dyn DroneRepository>,
    liveness_cache: Option<Arc<dyn LivenessCache>>,
    observers: Vec<Arc<dyn DroneStatusObserver>>,
    config: DroneServiceConfig,
}

impl DroneService {
    pub fn new(
        drone_repo: Arc<dyn DroneRepository>,
        liveness_cache: Option<Arc<dyn LivenessCache>>,
        observers: Vec<Arc<dyn DroneStatusObserver>>,
        config: Option<DroneServiceConfig>,
    ) -> Self {
        Self {
            drone_repo,
            liveness_cache,
            observers,
            config: config.unwrap_or_default(),
        }
    }

    /// 注册无人机，名称必须唯一
    pub async fn register_drone(&self, name: &str) -> DispatchResult<Drone> {
        if self.drone_repo.find_by_name(name).await?.is_some() {
            return Err(DispatchError::DuplicateDrone {
                name: name.to_string(),
            });
        }

        let drone = self.drone_repo.create(&Drone::new(name)).await?;
        info!("注册无人机: {} ({})", drone.name, drone.id);
        Ok(drone)
    }

    pub async fn get_drone(&self, id: Uuid) -> DispatchResult<Drone> {
        self.drone_repo
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::DroneNotFound { id })
    }

    pub async fn get_drone_by_name(&self, name: &str) -> DispatchResult<Drone> {
        self.drone_repo
            .find_by_name(name)
            .await?
            .ok_or_else(|| DispatchError::DroneNameNotFound {
                name: name.to_string(),
            })
    }

    pub async fn list_drones(&self) -> DispatchResult<Vec<Drone>> {
        self.drone_repo.find_all().await
    }

    pub async fn list_idle_drones(&self) -> DispatchResult<Vec<Drone>> {
        self.drone_repo.find_idle().await
    }

    pub async fn list_active_drones(&self) -> DispatchResult<Vec<Drone>> {
        self.drone_repo.find_active().await
    }

    /// 上报位置：持久化坐标，然后刷新位置缓存和心跳标记。
    ///
    /// 只写坐标列，不会覆盖并发的状态变更（例如调度中的 IDLE -> DELIVERING）。
    /// 缓存写入失败只记录日志。
    pub async fn update_location(&self, id: Uuid, position: Position) -> DispatchResult<Drone> {
        let drone = self.drone_repo.update_position(id, position).await?;

        if let Some(cache) = &self.liveness_cache {
            if let Err(e) = cache
                .set_position(id, position, self.config.location_ttl)
                .await
            {
                warn!("缓存无人机 {} 位置失败: {}", id, e);
            }
            if let Err(e) = cache.set_heartbeat(id, self.config.heartbeat_ttl).await {
                warn!("刷新无人机 {} 心跳失败: {}", id, e);
            }
        }

        debug!("无人机 {} 位置更新为 {}", id, position);
        Ok(drone)
    }

    /// 缓存中最近上报的位置，读取失败按未命中处理
    async fn cached_position(&self, id: Uuid) -> Option<Position> {
        let cache = self.liveness_cache.as_ref()?;
        match cache.get_position(id).await {
            Ok(position) => position,
            Err(e) => {
                warn!("读取无人机 {} 位置缓存失败: {}", id, e);
                None
            }
        }
    }

    /// 变更无人机状态。持久化成功后通知观察者，状态未变化时不做任何事。
    ///
    /// 观察者收到的位置优先取自位置缓存，缓存未命中时使用数据库中的坐标。
    pub async fn update_status(&self, id: Uuid, new_status: DroneStatus) -> DispatchResult<Drone> {
        let current = self.get_drone(id).await?;
        let old_status = current.status;

        if old_status == new_status {
            debug!("无人机 {} 状态已经是 {}，跳过", id, new_status);
            return Ok(current);
        }

        let drone = self.drone_repo.update_status(id, new_status).await?;
        info!("无人机 {} 状态变更: {} -> {}", id, old_status, new_status);

        if self.observers.is_empty() {
            return Ok(drone);
        }
        let position = self
            .cached_position(id)
            .await
            .unwrap_or(drone.position);
        for observer in &self.observers {
            observer
                .on_status_changed(id, old_status, new_status, position)
                .await;
        }

        Ok(drone)
    }
}
