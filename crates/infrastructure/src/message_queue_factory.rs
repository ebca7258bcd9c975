use std::sync::Arc;

use dispatch_core::{
    config::{MessageQueueConfig, MessageQueueType},
    DispatchError, DispatchResult,
};
use dispatch_domain::MessageBus;
use tracing::info;

use crate::{in_memory_queue::InMemoryMessageBus, message_queue::RabbitMQMessageBus};

/// 根据配置创建消息总线，未启用时返回None
pub async fn create_message_bus(
    config: &MessageQueueConfig,
) -> DispatchResult<Option<Arc<dyn MessageBus>>> {
    if !config.enabled {
        info!("消息总线未启用");
        return Ok(None);
    }

    config
        .validate()
        .map_err(|e| DispatchError::Configuration(e.to_string()))?;

    let bus: Arc<dyn MessageBus> = match config.r#type {
        MessageQueueType::Rabbitmq => {
            info!("使用RabbitMQ消息总线: {}", config.url);
            Arc::new(RabbitMQMessageBus::new(config).await?)
        }
        MessageQueueType::InMemory => {
            info!("使用内存消息总线");
            Arc::new(InMemoryMessageBus::new(config.redelivery_delay()))
        }
    };

    Ok(Some(bus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_bus() {
        let config = MessageQueueConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(create_message_bus(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_bus() {
        let config = MessageQueueConfig {
            r#type: MessageQueueType::InMemory,
            ..Default::default()
        };
        assert!(create_message_bus(&config).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = MessageQueueConfig {
            r#type: MessageQueueType::InMemory,
            dispatch_queue: String::new(),
            ..Default::default()
        };
        let err = create_message_bus(&config).await.err().unwrap();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }
}
