use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::DispatchResult;
use dispatch_domain::{MessageBus, MessageHandler};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 内存消息总线实现
///
/// 使用 Tokio channels 模拟交换机和持久化队列，适用于嵌入式部署和测试。
/// 路由键精确匹配，同一队列的多个订阅者竞争消费。
/// 处理失败的消息在后台延迟后重新入队，不阻塞同一队列上的后续消息。
pub struct InMemoryMessageBus {
    /// 队列名 -> 队列
    queues: RwLock<HashMap<String, QueueChannels>>,
    /// 路由键 -> 绑定的队列名
    bindings: RwLock<HashMap<String, Vec<String>>>,
    redelivery_delay: Duration,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    published: AtomicU64,
}

struct QueueChannels {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    /// 使用 Arc 包装接收端，支持多个消费者
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl InMemoryMessageBus {
    pub fn new(redelivery_delay: Duration) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            redelivery_delay,
            consumers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    /// 已发布的消息数量
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    async fn consume_loop(
        queue: String,
        sender: mpsc::UnboundedSender<Vec<u8>>,
        receiver: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
        handler: Arc<dyn MessageHandler>,
        redelivery_delay: Duration,
    ) {
        loop {
            let payload = {
                let mut receiver = receiver.lock().await;
                match receiver.recv().await {
                    Some(payload) => payload,
                    None => break,
                }
            };

            if let Err(e) = handler.handle(&payload).await {
                warn!("处理消息失败，稍后重新投递 (队列 {}): {}", queue, e);
                let sender = sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(redelivery_delay).await;
                    let _ = sender.send(payload);
                });
            }
        }

        debug!("队列 {} 的消费者已停止", queue);
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> DispatchResult<()> {
        self.published.fetch_add(1, Ordering::Relaxed);

        let bindings = self.bindings.read().await;
        let Some(bound_queues) = bindings.get(routing_key) else {
            debug!("路由键 {} 没有绑定的队列，消息被丢弃", routing_key);
            return Ok(());
        };

        let queues = self.queues.read().await;
        for queue in bound_queues {
            if let Some(channels) = queues.get(queue) {
                if channels.sender.send(payload.to_vec()).is_err() {
                    warn!("队列 {} 已关闭，消息未投递", queue);
                }
            }
        }

        debug!("消息已发布: {}", routing_key);
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DispatchResult<()> {
        let (sender, receiver) = {
            let mut queues = self.queues.write().await;
            let channels = queues.entry(queue.to_string()).or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                QueueChannels {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                }
            });
            (channels.sender.clone(), Arc::clone(&channels.receiver))
        };

        {
            let mut bindings = self.bindings.write().await;
            let bound = bindings.entry(routing_key.to_string()).or_default();
            if !bound.iter().any(|q| q == queue) {
                bound.push(queue.to_string());
            }
        }

        let handle = tokio::spawn(Self::consume_loop(
            queue.to_string(),
            sender,
            receiver,
            handler,
            self.redelivery_delay,
        ));
        self.consumers.lock().await.push(handle);

        info!("内存队列 {} 已订阅路由键 {}", queue, routing_key);
        Ok(())
    }

    async fn close(&self) -> DispatchResult<()> {
        for handle in self.consumers.lock().await.drain(..) {
            handle.abort();
        }
        self.queues.write().await.clear();
        self.bindings.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::DispatchError;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, timeout};

    /// 前 `failures` 次处理返回错误
    struct FlakyHandler {
        calls: AtomicUsize,
        failures: usize,
        received: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl FlakyHandler {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                received: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn successes(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        async fn handle(&self, payload: &[u8]) -> DispatchResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DispatchError::NoIdleDrones);
            }
            self.received.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_publish_and_consume() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(10));
        let handler = FlakyHandler::new(0);

        bus.subscribe("dispatch", "order.created", handler.clone())
            .await
            .unwrap();
        bus.publish("order.created", b"hello").await.unwrap();

        wait_for(|| handler.successes() == 1).await;
        assert_eq!(handler.received.lock().unwrap()[0], b"hello".to_vec());
        assert_eq!(bus.published_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_message_is_redelivered() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(10));
        let handler = FlakyHandler::new(2);

        bus.subscribe("dispatch", "order.created", handler.clone())
            .await
            .unwrap();
        bus.publish("order.created", b"retry-me").await.unwrap();

        wait_for(|| handler.successes() == 1).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_block_next_message() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(500));
        let handler = FlakyHandler::new(1);

        bus.subscribe("dispatch", "order.created", handler.clone())
            .await
            .unwrap();
        bus.publish("order.created", b"first").await.unwrap();
        bus.publish("order.created", b"second").await.unwrap();

        timeout(Duration::from_millis(200), async {
            while handler.successes() == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second message waited for the first one's redelivery");
        assert_eq!(handler.received.lock().unwrap()[0], b"second".to_vec());

        wait_for(|| handler.successes() == 2).await;
        assert_eq!(handler.received.lock().unwrap()[1], b"first".to_vec());
    }

    #[tokio::test]
    async fn test_unbound_routing_key_is_dropped() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(10));
        let handler = FlakyHandler::new(0);

        bus.subscribe("dispatch", "order.created", handler.clone())
            .await
            .unwrap();
        bus.publish("order.cancelled", b"ignored").await.unwrap();
        bus.publish("order.created", b"delivered").await.unwrap();

        wait_for(|| handler.successes() == 1).await;
        sleep(Duration::from_millis(30)).await;
        assert_eq!(handler.successes(), 1);
        assert_eq!(handler.received.lock().unwrap()[0], b"delivered".to_vec());
    }

    #[tokio::test]
    async fn test_consumers_on_same_queue_compete() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(10));
        let first = FlakyHandler::new(0);
        let second = FlakyHandler::new(0);

        bus.subscribe("dispatch", "order.created", first.clone())
            .await
            .unwrap();
        bus.subscribe("dispatch", "order.created", second.clone())
            .await
            .unwrap();

        for i in 0..10u8 {
            bus.publish("order.created", &[i]).await.unwrap();
        }

        wait_for(|| first.successes() + second.successes() == 10).await;
        sleep(Duration::from_millis(30)).await;
        assert_eq!(first.successes() + second.successes(), 10);
    }

    #[tokio::test]
    async fn test_close_stops_consumers() {
        let bus = InMemoryMessageBus::new(Duration::from_millis(10));
        let handler = FlakyHandler::new(0);

        bus.subscribe("dispatch", "order.created", handler.clone())
            .await
            .unwrap();
        bus.close().await.unwrap();
        bus.publish("order.created", b"after-close").await.unwrap();

        sleep(Duration::from_millis(30)).await;
        assert_eq!(handler.successes(), 0);
    }
}
