use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::{config::MessageQueueConfig, DispatchError, DispatchResult};
use dispatch_domain::{MessageBus, MessageHandler};
use futures::StreamExt;
use lapin::{
    message::Delivery, options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties, Consumer, ExchangeKind,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// RabbitMQ消息总线实现
///
/// 所有消息发布到一个持久化的topic交换机，订阅方声明持久化队列并按路由键绑定。
/// 消费采用手动确认：处理成功ack，失败则在后台延迟一段时间后nack并重新入队，
/// 延迟期间消费循环继续处理后续消息。
pub struct RabbitMQMessageBus {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    exchange: String,
    redelivery_delay: Duration,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl RabbitMQMessageBus {
    /// 创建新的RabbitMQ消息总线
    pub async fn new(config: &MessageQueueConfig) -> DispatchResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("开启发布确认失败: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                DispatchError::MessageQueue(format!("声明交换机 {} 失败: {e}", config.exchange))
            })?;

        info!("成功连接到RabbitMQ，交换机: {}", config.exchange);

        Ok(Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            exchange: config.exchange.clone(),
            redelivery_delay: config.redelivery_delay(),
            consumers: Mutex::new(Vec::new()),
        })
    }

    /// 声明队列并绑定到交换机
    async fn declare_and_bind(
        &self,
        channel: &Channel,
        queue: &str,
        routing_key: &str,
    ) -> DispatchResult<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("声明队列 {queue} 失败: {e}")))?;

        channel
            .queue_bind(
                queue,
                &self.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                DispatchError::MessageQueue(format!(
                    "绑定队列 {queue} 到路由键 {routing_key} 失败: {e}"
                ))
            })?;

        debug!("队列 {} 已绑定到 {}", queue, routing_key);
        Ok(())
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 延迟后拒绝消息并重新入队
    fn schedule_redelivery(queue: &str, delivery: Delivery, redelivery_delay: Duration) {
        let queue = queue.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(redelivery_delay).await;
            let options = BasicNackOptions {
                requeue: true,
                ..Default::default()
            };
            if let Err(e) = delivery.nack(options).await {
                error!("拒绝消息失败 (队列 {}): {}", queue, e);
            }
        });
    }

    async fn consume_loop(
        queue: String,
        mut consumer: Consumer,
        handler: Arc<dyn MessageHandler>,
        redelivery_delay: Duration,
    ) {
        info!("开始消费队列: {}", queue);

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    Self::dispatch_delivery(&queue, delivery, &handler, redelivery_delay).await
                }
                Err(e) => {
                    error!("从队列 {} 接收消息失败: {}", queue, e);
                    break;
                }
            }
        }

        warn!("队列 {} 的消费者已停止", queue);
    }

    async fn dispatch_delivery(
        queue: &str,
        delivery: Delivery,
        handler: &Arc<dyn MessageHandler>,
        redelivery_delay: Duration,
    ) {
        match handler.handle(&delivery.data).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!("确认消息失败 (队列 {}): {}", queue, e);
                }
            }
            Err(e) => {
                warn!("处理消息失败，稍后重新投递 (队列 {}): {}", queue, e);
                Self::schedule_redelivery(queue, delivery, redelivery_delay);
            }
        }
    }
}

#[async_trait]
impl MessageBus for RabbitMQMessageBus {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> DispatchResult<()> {
        let channel = self.channel.lock().await;

        let confirm = channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // 2 = persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                DispatchError::MessageQueue(format!("发布消息到 {routing_key} 失败: {e}"))
            })?;

        // 等待确认
        confirm
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("消息发布确认失败: {e}")))?;

        debug!("消息已发布: {}", routing_key);
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DispatchResult<()> {
        let consumer = {
            let channel = self.channel.lock().await;
            self.declare_and_bind(&channel, queue, routing_key).await?;

            channel
                .basic_consume(
                    queue,
                    &format!("{queue}-consumer"),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| DispatchError::MessageQueue(format!("创建消费者失败: {e}")))?
        };

        let handle = tokio::spawn(Self::consume_loop(
            queue.to_string(),
            consumer,
            handler,
            self.redelivery_delay,
        ));
        self.consumers.lock().await.push(handle);

        Ok(())
    }

    async fn close(&self) -> DispatchResult<()> {
        for handle in self.consumers.lock().await.drain(..) {
            handle.abort();
        }

        if !self.is_connected() {
            warn!("RabbitMQ连接已断开，跳过关闭");
            return Ok(());
        }

        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| DispatchError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}
