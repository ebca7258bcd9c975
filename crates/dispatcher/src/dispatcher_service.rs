use std::sync::Arc;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{DroneStatus, Order, OrderRepository};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::drone_service::DroneService;

/// 调度协调器
///
/// 并发安全完全依赖存储层的原子领取，这里不持有任何锁。
pub struct DispatcherService {
    drone_service: Arc<DroneService>,
    order_repo: Arc<dyn OrderRepository>,
}

impl DispatcherService {
    pub fn new(drone_service: Arc<DroneService>, order_repo: Arc<dyn OrderRepository>) -> Self {
        Self {
            drone_service,
            order_repo,
        }
    }

    /// 为空闲无人机领取最早的待处理订单。
    ///
    /// 领取成功但无人机状态写入失败时，补偿性地释放订单并返回原始错误。
    #[instrument(skip(self))]
    pub async fn reserve_job(&self, drone_id: Uuid) -> DispatchResult<Order> {
        let drone = self.drone_service.get_drone(drone_id).await?;
        if !drone.is_idle() {
            return Err(DispatchError::drone_not_idle(drone_id, drone.status));
        }

        let order = self.order_repo.claim_next_pending(drone_id).await?;
        debug!("无人机 {} 领取了订单 {}", drone_id, order.id);

        if let Err(e) = self
            .drone_service
            .update_status(drone_id, DroneStatus::Delivering)
            .await
        {
            warn!(
                "无人机 {} 状态更新失败，回滚订单 {}: {}",
                drone_id, order.id, e
            );
            self.rollback_claim(&order, drone_id).await;
            return Err(e);
        }

        info!("订单 {} 已分配给无人机 {}", order.id, drone.name);
        Ok(order)
    }

    async fn rollback_claim(&self, order: &Order, drone_id: Uuid) {
        match self.order_repo.release_claim(order.id, drone_id).await {
            Ok(true) => info!("订单 {} 已回滚为待处理", order.id),
            Ok(false) => warn!(
                "订单 {} 已不再由无人机 {} 持有，跳过回滚",
                order.id, drone_id
            ),
            Err(e) => error!("回滚订单 {} 失败: {}", order.id, e),
        }
    }
}
