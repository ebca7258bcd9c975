use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch_core::config::AppConfig;
use dispatch_dispatcher::{
    DispatcherService, DroneService, DroneServiceConfig, HeartbeatMonitor,
    HeartbeatMonitorConfig, OrderDispatchWorker, OrderService, RecoveryHandler,
};
use dispatch_domain::{DroneStatusObserver, LivenessCache, MessageBus};
use dispatch_infrastructure::{
    create_message_bus, DatabaseManager, PostgresDroneRepository, PostgresOrderRepository,
    RedisLivenessCache,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 主应用程序，负责组装并运行各个组件
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    liveness_cache: Option<Arc<dyn LivenessCache>>,
    message_bus: Option<Arc<dyn MessageBus>>,
    drone_service: Arc<DroneService>,
    order_service: Arc<OrderService>,
    dispatcher: Arc<DispatcherService>,
}

impl Application {
    pub async fn new(config: AppConfig, run_migrations: bool) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database).await?;
        database.health_check().await.context("数据库健康检查失败")?;
        if run_migrations {
            database.migrate().await?;
        }

        let liveness_cache: Option<Arc<dyn LivenessCache>> = if config.cache.enabled {
            let cache = RedisLivenessCache::new(&config.cache.redis_url)
                .await
                .context("连接Redis失败")?;
            Some(Arc::new(cache))
        } else {
            warn!("缓存未启用，心跳监控将不会运行");
            None
        };

        let message_bus = create_message_bus(&config.message_queue)
            .await
            .context("创建消息总线失败")?;

        let drone_repo = Arc::new(PostgresDroneRepository::new(database.pool().clone()));
        let order_repo = Arc::new(PostgresOrderRepository::new(database.pool().clone()));

        let observers: Vec<Arc<dyn DroneStatusObserver>> =
            vec![Arc::new(RecoveryHandler::new(order_repo.clone()))];

        let drone_service = Arc::new(DroneService::new(
            drone_repo,
            liveness_cache.clone(),
            observers,
            Some(DroneServiceConfig {
                heartbeat_ttl: config.cache.heartbeat_ttl(),
                location_ttl: config.cache.location_ttl(),
            }),
        ));
        let order_service = Arc::new(OrderService::new(
            order_repo.clone(),
            Arc::clone(&drone_service),
            message_bus.clone(),
            Some(config.message_queue.publish_timeout()),
        ));
        let dispatcher = Arc::new(DispatcherService::new(
            Arc::clone(&drone_service),
            order_repo,
        ));

        Ok(Self {
            config,
            database,
            liveness_cache,
            message_bus,
            drone_service,
            order_service,
            dispatcher,
        })
    }

    pub fn drone_service(&self) -> Arc<DroneService> {
        Arc::clone(&self.drone_service)
    }

    pub fn order_service(&self) -> Arc<OrderService> {
        Arc::clone(&self.order_service)
    }

    pub fn dispatcher(&self) -> Arc<DispatcherService> {
        Arc::clone(&self.dispatcher)
    }

    /// 启动后台组件并阻塞到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let monitor_handle = self.start_heartbeat_monitor(&shutdown_rx);
        self.start_dispatch_worker().await?;

        info!("应用程序已启动");
        let _ = shutdown_rx.recv().await;
        info!("开始关闭应用程序组件");

        if let Some(handle) = monitor_handle {
            if let Err(e) = handle.await {
                error!("心跳监控任务异常退出: {}", e);
            }
        }

        if let Some(bus) = &self.message_bus {
            if let Err(e) = bus.close().await {
                warn!("关闭消息总线失败: {}", e);
            }
        }

        self.database.close().await;
        info!("应用程序组件已关闭");
        Ok(())
    }

    fn start_heartbeat_monitor(
        &self,
        shutdown_rx: &broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.dispatcher.heartbeat_monitor_enabled {
            info!("心跳监控已禁用");
            return None;
        }
        let Some(cache) = &self.liveness_cache else {
            warn!("没有可用的缓存，跳过心跳监控");
            return None;
        };

        let monitor = HeartbeatMonitor::new(
            Arc::clone(&self.drone_service),
            Arc::clone(cache),
            Some(HeartbeatMonitorConfig {
                scan_interval: self.config.dispatcher.heartbeat_scan_interval(),
                check_timeout: self.config.dispatcher.heartbeat_check_timeout(),
            }),
        );
        let shutdown_rx = shutdown_rx.resubscribe();

        Some(tokio::spawn(async move {
            monitor.run(shutdown_rx).await;
        }))
    }

    async fn start_dispatch_worker(&self) -> Result<()> {
        if !self.config.dispatcher.dispatch_worker_enabled {
            info!("调度工作者已禁用");
            return Ok(());
        }
        let Some(bus) = &self.message_bus else {
            warn!("没有可用的消息总线，跳过调度工作者");
            return Ok(());
        };

        let worker = Arc::new(OrderDispatchWorker::new(
            Arc::clone(&self.drone_service),
            Arc::clone(&self.dispatcher),
            Arc::clone(bus),
            self.config.message_queue.dispatch_queue.clone(),
            self.config.message_queue.order_created_routing_key.clone(),
        ));
        worker.start().await.context("启动调度工作者失败")?;
        Ok(())
    }
}
