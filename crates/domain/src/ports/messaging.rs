use std::sync::Arc;

use async_trait::async_trait;
use dispatch_core::DispatchResult;

/// 消息处理器
///
/// 返回 `Ok` 时消息被确认，返回 `Err` 时消息被拒绝并重新入队（至少一次投递）。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> DispatchResult<()>;
}

/// Interface for message bus operations
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> DispatchResult<()>;

    /// 声明持久化队列并绑定到路由键，在后台持续消费
    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DispatchResult<()>;

    /// 停止消费并释放连接
    async fn close(&self) -> DispatchResult<()> {
        Ok(())
    }
}
