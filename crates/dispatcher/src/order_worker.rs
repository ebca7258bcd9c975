use std::sync::Arc;

use async_trait::async_trait;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{DomainEvent, MessageBus, MessageHandler, OrderCreatedEvent};
use tracing::{debug, info, warn};

use crate::dispatcher_service::DispatcherService;
use crate::drone_service::DroneService;

/// 异步调度工作者
///
/// 消费订单创建事件并为第一个空闲无人机领取订单。返回错误的消息会被重新投递，
/// 无法解析的消息直接确认丢弃。
pub struct OrderDispatchWorker {
    drone_service: Arc<DroneService>,
    dispatcher: Arc<DispatcherService>,
    message_bus: Arc<dyn MessageBus>,
    queue: String,
    routing_key: String,
}

impl OrderDispatchWorker {
    pub fn new(
        drone_service: Arc<DroneService>,
        dispatcher: Arc<DispatcherService>,
        message_bus: Arc<dyn MessageBus>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            drone_service,
            dispatcher,
            message_bus,
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }

    /// 订阅调度队列
    pub async fn start(self: &Arc<Self>) -> DispatchResult<()> {
        let handler: Arc<dyn MessageHandler> = Arc::clone(self) as Arc<dyn MessageHandler>;
        self.message_bus
            .subscribe(&self.queue, &self.routing_key, handler)
            .await?;
        info!(
            "调度工作者已启动: 队列 {}，路由键 {}",
            self.queue, self.routing_key
        );
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for OrderDispatchWorker {
    async fn handle(&self, payload: &[u8]) -> DispatchResult<()> {
        let event = match OrderCreatedEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("丢弃无法解析的订单创建消息: {}", e);
                return Ok(());
            }
        };
        debug!("收到订单创建事件: {}", event.order_id);

        let idle = self.drone_service.list_idle_drones().await?;
        let drone = idle.first().ok_or(DispatchError::NoIdleDrones)?;

        let order = self.dispatcher.reserve_job(drone.id).await.inspect_err(|e| {
            if e.is_retryable() {
                debug!("订单事件 {} 暂时无法调度，等待重新投递: {}", event.order_id, e);
            } else {
                warn!("订单事件 {} 调度失败，等待重新投递: {}", event.order_id, e);
            }
        })?;
        info!(
            "事件 {} 触发调度: 订单 {} -> 无人机 {}",
            event.order_id, order.id, drone.name
        );
        Ok(())
    }
}
