use std::sync::Arc;

use async_trait::async_trait;
use dispatch_domain::{DroneStatus, DroneStatusObserver, OrderRepository, Position};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 故障恢复处理器
///
/// 配送中的无人机报告故障时，把它手上的订单重新开放，取货点改为无人机最后的位置。
/// 离线不会触发恢复。
pub struct RecoveryHandler {
    order_repo: Arc<dyn OrderRepository>,
}

impl RecoveryHandler {
    pub fn new(order_repo: Arc<dyn OrderRepository>) -> Self {
        Self { order_repo }
    }

    async fn recover(&self, drone_id: Uuid, position: Position) {
        let order = match self.order_repo.find_active_by_drone_id(drone_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                info!("故障无人机 {} 没有进行中的订单", drone_id);
                return;
            }
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                error!("查询故障无人机 {} 的订单失败: {}", drone_id, e);
                return;
            }
        };

        let mut order = order;
        let order_id = order.id;
        order.reopen_at(position);

        match self.order_repo.update(&order).await {
            Ok(()) => info!(
                "订单 {} 已从故障无人机 {} 收回，新的取货点 {}",
                order_id, drone_id, position
            ),
            Err(e) => warn!("收回订单 {} 失败: {}", order_id, e),
        }
    }
}

#[async_trait]
impl DroneStatusObserver for RecoveryHandler {
    async fn on_status_changed(
        &self,
        drone_id: Uuid,
        old_status: DroneStatus,
        new_status: DroneStatus,
        last_position: Position,
    ) {
        if old_status == DroneStatus::Delivering && new_status == DroneStatus::Broken {
            self.recover(drone_id, last_position).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_domain::OrderStatus;
    use dispatch_testing_utils::{MockOrderRepository, OrderBuilder};

    #[tokio::test]
    async fn test_recovers_order_at_failure_point() {
        let drone_id = Uuid::new_v4();
        let order = OrderBuilder::new().picked_up_by(drone_id).build();
        let repo = MockOrderRepository::with_orders(vec![order.clone()]);
        let handler = RecoveryHandler::new(Arc::new(repo.clone()));

        handler
            .on_status_changed(
                drone_id,
                DroneStatus::Delivering,
                DroneStatus::Broken,
                Position::new(15.0, 12.0),
            )
            .await;

        let stored = repo.get(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.drone_id, None);
        assert_eq!(stored.origin, Position::new(15.0, 12.0));
        assert_eq!(stored.destination, order.destination);
        assert!(stored.updated_at >= order.updated_at);
    }

    #[tokio::test]
    async fn test_recovers_reserved_order_before_pickup() {
        let drone_id = Uuid::new_v4();
        let order = OrderBuilder::new().from(10.0, 10.0).reserved_by(drone_id).build();
        let other = OrderBuilder::new().reserved_by(Uuid::new_v4()).build();
        let repo = MockOrderRepository::with_orders(vec![order.clone(), other.clone()]);
        let handler = RecoveryHandler::new(Arc::new(repo.clone()));

        handler
            .on_status_changed(
                drone_id,
                DroneStatus::Delivering,
                DroneStatus::Broken,
                Position::new(15.0, 12.0),
            )
            .await;

        let stored = repo.get(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.drone_id, None);
        assert_eq!(stored.origin, Position::new(15.0, 12.0));
        assert_eq!(repo.get(other.id).unwrap(), other);
    }

    #[tokio::test]
    async fn test_ignores_other_transitions() {
        let drone_id = Uuid::new_v4();
        let order = OrderBuilder::new().reserved_by(drone_id).build();
        let repo = MockOrderRepository::with_orders(vec![order.clone()]);
        let handler = RecoveryHandler::new(Arc::new(repo.clone()));

        let transitions = [
            (DroneStatus::Idle, DroneStatus::Broken),
            (DroneStatus::Delivering, DroneStatus::Offline),
            (DroneStatus::Delivering, DroneStatus::Idle),
            (DroneStatus::Idle, DroneStatus::Delivering),
            (DroneStatus::Broken, DroneStatus::Idle),
        ];
        for (old, new) in transitions {
            handler
                .on_status_changed(drone_id, old, new, Position::new(1.0, 1.0))
                .await;
        }

        assert_eq!(repo.find_active_calls(), 0);
        assert_eq!(repo.get(order.id).unwrap(), order);
    }

    #[tokio::test]
    async fn test_no_active_order_is_noop() {
        let repo = MockOrderRepository::new();
        let handler = RecoveryHandler::new(Arc::new(repo.clone()));

        handler
            .on_status_changed(
                Uuid::new_v4(),
                DroneStatus::Delivering,
                DroneStatus::Broken,
                Position::new(1.0, 1.0),
            )
            .await;
        assert_eq!(repo.find_active_calls(), 1);
    }

    #[tokio::test]
    async fn test_storage_errors_are_swallowed() {
        let drone_id = Uuid::new_v4();
        let order = OrderBuilder::new().picked_up_by(drone_id).build();
        let repo = MockOrderRepository::with_orders(vec![order.clone()]);
        let handler = RecoveryHandler::new(Arc::new(repo.clone()));

        repo.set_fail_find_active(true);
        handler
            .on_status_changed(
                drone_id,
                DroneStatus::Delivering,
                DroneStatus::Broken,
                Position::new(1.0, 1.0),
            )
            .await;

        repo.set_fail_find_active(false);
        repo.set_fail_updates(true);
        handler
            .on_status_changed(
                drone_id,
                DroneStatus::Delivering,
                DroneStatus::Broken,
                Position::new(1.0, 1.0),
            )
            .await;

        assert_eq!(repo.get(order.id).unwrap().status, OrderStatus::PickedUp);
    }
}
