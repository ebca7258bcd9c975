use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{
    DomainEvent, DroneStatus, MessageBus, Order, OrderCreatedEvent, OrderRepository,
    OrderStatus, Position,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::drone_service::DroneService;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// 订单服务，负责订单生命周期状态机
pub struct OrderService {
    order_repo: Arc<dyn OrderRepository>,
    drone_service: Arc<DroneService>,
    message_bus: Option<Arc<dyn MessageBus>>,
    publish_timeout: Duration,
}

impl OrderService {
    pub fn new(
        order_repo: Arc<dyn OrderRepository>,
        drone_service: Arc<DroneService>,
        message_bus: Option<Arc<dyn MessageBus>>,
        publish_timeout: Option<Duration>,
    ) -> Self {
        Self {
            order_repo,
            drone_service,
            message_bus,
            publish_timeout: publish_timeout.unwrap_or(DEFAULT_PUBLISH_TIMEOUT),
        }
    }

    /// 创建订单并发布 `order.created` 事件。
    ///
    /// 订单落库即视为创建成功，事件发布失败或超时只记录日志。
    pub async fn create_order(
        &self,
        origin: Position,
        destination: Position,
    ) -> DispatchResult<Order> {
        let order = self
            .order_repo
            .create(&Order::new(origin, destination))
            .await?;
        info!("创建订单 {}: {} -> {}", order.id, origin, destination);

        self.publish_created(&order).await;
        Ok(order)
    }

    async fn publish_created(&self, order: &Order) {
        let Some(bus) = &self.message_bus else {
            return;
        };

        let event = OrderCreatedEvent::from_order(order);
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("序列化订单 {} 创建事件失败: {}", order.id, e);
                return;
            }
        };

        match timeout(
            self.publish_timeout,
            bus.publish(event.routing_key(), &payload),
        )
        .await
        {
            Ok(Ok(())) => debug!("订单 {} 创建事件已发布", order.id),
            Ok(Err(e)) => warn!("发布订单 {} 创建事件失败: {}", order.id, e),
            Err(_) => warn!(
                "发布订单 {} 创建事件超时 ({:?})",
                order.id, self.publish_timeout
            ),
        }
    }

    pub async fn get_order(&self, id: Uuid) -> DispatchResult<Order> {
        self.order_repo
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::OrderNotFound { id })
    }

    pub async fn list_orders(&self) -> DispatchResult<Vec<Order>> {
        self.order_repo.find_all().await
    }

    /// 按转换表推进订单状态。
    ///
    /// 进入 RESERVED 必须同时指派无人机，只能由 `DispatcherService::reserve_job` 完成，
    /// 这里的 PENDING -> RESERVED 返回 `UnassignedReservation`。
    pub async fn transition(&self, id: Uuid, target: OrderStatus) -> DispatchResult<Order> {
        let mut order = self.get_order(id).await?;
        let previous_drone = order.drone_id;
        let from = order.status;

        if target == OrderStatus::Reserved && order.drone_id.is_none() {
            if from.can_transition_to(target) {
                return Err(DispatchError::UnassignedReservation { id });
            }
            return Err(DispatchError::invalid_transition(from, target));
        }

        order.transition_to(target)?;
        self.order_repo.update(&order).await?;
        info!("订单 {} 状态变更: {} -> {}", id, from, target);

        if target.is_terminal() {
            if let Some(drone_id) = previous_drone {
                self.release_drone(drone_id, id).await;
            }
        }

        Ok(order)
    }

    /// 订单结束后把仍处于配送中的无人机放回空闲
    async fn release_drone(&self, drone_id: Uuid, order_id: Uuid) {
        let drone = match self.drone_service.get_drone(drone_id).await {
            Ok(drone) => drone,
            Err(e) => {
                warn!("订单 {} 结束后查询无人机 {} 失败: {}", order_id, drone_id, e);
                return;
            }
        };

        if drone.status != DroneStatus::Delivering {
            return;
        }

        if let Err(e) = self
            .drone_service
            .update_status(drone_id, DroneStatus::Idle)
            .await
        {
            warn!("订单 {} 结束后释放无人机 {} 失败: {}", order_id, drone_id, e);
        }
    }

    /// 客户撤回订单，只有 PENDING 和 RESERVED 的订单可以撤回
    pub async fn withdraw_order(&self, id: Uuid) -> DispatchResult<Order> {
        self.transition(id, OrderStatus::Cancelled).await
    }

    pub async fn update_coordinates(
        &self,
        id: Uuid,
        origin: Position,
        destination: Position,
    ) -> DispatchResult<Order> {
        let mut order = self.get_order(id).await?;
        order.update_coordinates(origin, destination)?;
        self.order_repo.update(&order).await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::ErrorKind;
    use dispatch_domain::ORDER_CREATED_ROUTING_KEY;
    use dispatch_testing_utils::{
        DroneBuilder, MockDroneRepository, MockMessageBus, MockOrderRepository, OrderBuilder,
    };

    fn build(
        drones: &MockDroneRepository,
        orders: &MockOrderRepository,
        bus: Option<&MockMessageBus>,
    ) -> OrderService {
        let drone_service = Arc::new(DroneService::new(
            Arc::new(drones.clone()),
            None,
            vec![],
            None,
        ));
        OrderService::new(
            Arc::new(orders.clone()),
            drone_service,
            bus.map(|b| Arc::new(b.clone()) as Arc<dyn MessageBus>),
            Some(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_create_order_publishes_event() {
        let orders = MockOrderRepository::new();
        let bus = MockMessageBus::new();
        let service = build(&MockDroneRepository::new(), &orders, Some(&bus));

        let order = service
            .create_order(Position::new(10.0, 10.0), Position::new(20.0, 20.0))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(orders.get(order.id).is_some());

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, ORDER_CREATED_ROUTING_KEY);
        let event = OrderCreatedEvent::from_payload(&published[0].1).unwrap();
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.dest_lat, 20.0);
    }

    #[tokio::test]
    async fn test_create_order_survives_publish_failure() {
        let orders = MockOrderRepository::new();
        let bus = MockMessageBus::new();
        bus.set_fail_publish(true);
        let service = build(&MockDroneRepository::new(), &orders, Some(&bus));

        let order = service
            .create_order(Position::new(1.0, 1.0), Position::new(2.0, 2.0))
            .await
            .unwrap();
        assert!(orders.get(order.id).is_some());
    }

    #[tokio::test]
    async fn test_create_order_survives_publish_timeout() {
        let orders = MockOrderRepository::new();
        let bus = MockMessageBus::new();
        bus.set_publish_delay(Duration::from_millis(500));
        let service = build(&MockDroneRepository::new(), &orders, Some(&bus));

        let order = service
            .create_order(Position::new(1.0, 1.0), Position::new(2.0, 2.0))
            .await
            .unwrap();
        assert!(orders.get(order.id).is_some());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_transition_unknown_order() {
        let service = build(&MockDroneRepository::new(), &MockOrderRepository::new(), None);
        let err = service
            .transition(Uuid::new_v4(), OrderStatus::Reserved)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_rejected_transition_is_not_persisted() {
        let order = OrderBuilder::new().build();
        let orders = MockOrderRepository::with_orders(vec![order.clone()]);
        let service = build(&MockDroneRepository::new(), &orders, None);

        let err = service
            .transition(order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        assert_eq!(orders.get(order.id).unwrap(), order);
    }

    #[tokio::test]
    async fn test_reserve_without_drone_is_rejected() {
        let pending = OrderBuilder::new().build();
        let delivered = OrderBuilder::new()
            .with_status(OrderStatus::Delivered)
            .build();
        let orders = MockOrderRepository::with_orders(vec![pending.clone(), delivered.clone()]);
        let service = build(&MockDroneRepository::new(), &orders, None);

        let err = service
            .transition(pending.id, OrderStatus::Reserved)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnassignedReservation { id } if id == pending.id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(orders.get(pending.id).unwrap(), pending);

        let err = service
            .transition(delivered.id, OrderStatus::Reserved)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let stored = orders.get(pending.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.drone_id, None);
    }

    #[tokio::test]
    async fn test_delivered_releases_drone() {
        let drone = DroneBuilder::new().delivering().build();
        let order = OrderBuilder::new().picked_up_by(drone.id).build();
        let drones = MockDroneRepository::with_drones(vec![drone.clone()]);
        let orders = MockOrderRepository::with_orders(vec![order.clone()]);
        let service = build(&drones, &orders, None);

        let delivered = service
            .transition(order.id, OrderStatus::Delivered)
            .await
            .unwrap();

        assert_eq!(delivered.drone_id, None);
        assert_eq!(orders.get(order.id).unwrap().status, OrderStatus::Delivered);
        assert_eq!(drones.get(drone.id).unwrap().status, DroneStatus::Idle);
    }

    #[tokio::test]
    async fn test_terminal_transition_leaves_broken_drone() {
        let drone = DroneBuilder::new().with_status(DroneStatus::Broken).build();
        let order = OrderBuilder::new().picked_up_by(drone.id).build();
        let drones = MockDroneRepository::with_drones(vec![drone.clone()]);
        let orders = MockOrderRepository::with_orders(vec![order.clone()]);
        let service = build(&drones, &orders, None);

        service
            .transition(order.id, OrderStatus::Failed)
            .await
            .unwrap();
        assert_eq!(drones.get(drone.id).unwrap().status, DroneStatus::Broken);
    }

    #[tokio::test]
    async fn test_withdraw_order() {
        let pending = OrderBuilder::new().build();
        let picked = OrderBuilder::new().picked_up_by(Uuid::new_v4()).build();
        let orders = MockOrderRepository::with_orders(vec![pending.clone(), picked.clone()]);
        let service = build(&MockDroneRepository::new(), &orders, None);

        let cancelled = service.withdraw_order(pending.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let err = service.withdraw_order(picked.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(orders.get(picked.id).unwrap().status, OrderStatus::PickedUp);
    }

    #[tokio::test]
    async fn test_update_coordinates_only_while_pending() {
        let pending = OrderBuilder::new().build();
        let reserved = OrderBuilder::new().reserved_by(Uuid::new_v4()).build();
        let orders = MockOrderRepository::with_orders(vec![pending.clone(), reserved.clone()]);
        let service = build(&MockDroneRepository::new(), &orders, None);

        service
            .update_coordinates(pending.id, Position::new(1.0, 2.0), Position::new(3.0, 4.0))
            .await
            .unwrap();
        let stored = orders.get(pending.id).unwrap();
        assert_eq!(stored.origin, Position::new(1.0, 2.0));
        assert_eq!(stored.destination, Position::new(3.0, 4.0));

        let err = service
            .update_coordinates(reserved.id, Position::new(1.0, 2.0), Position::new(3.0, 4.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::OrderNotEditable { .. }));
    }
}
