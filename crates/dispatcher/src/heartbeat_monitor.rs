use std::sync::Arc;
use std::time::Duration;

use dispatch_core::DispatchResult;
use dispatch_domain::{DroneStatus, LivenessCache};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::drone_service::DroneService;

/// 心跳监控配置
#[derive(Debug, Clone)]
pub struct HeartbeatMonitorConfig {
    /// 扫描间隔
    pub scan_interval: Duration,
    /// 单个无人机心跳查询的超时时间
    pub check_timeout: Duration,
}

impl Default for HeartbeatMonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            check_timeout: Duration::from_secs(2),
        }
    }
}

/// 一轮扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatScanReport {
    /// 完成心跳查询的无人机数量
    pub checked: usize,
    pub marked_offline: usize,
    /// 查询出错、超时或状态更新失败的数量
    pub failures: usize,
    /// 扫描途中收到停止信号
    pub cancelled: bool,
}

/// 心跳监控
///
/// 周期性检查活跃无人机（空闲或配送中）的心跳标记，标记缺失的无人机置为离线。
pub struct HeartbeatMonitor {
    drone_service: Arc<DroneService>,
    liveness_cache: Arc<dyn LivenessCache>,
    config: HeartbeatMonitorConfig,
}

impl HeartbeatMonitor {
    pub fn new(
        drone_service: Arc<DroneService>,
        liveness_cache: Arc<dyn LivenessCache>,
        config: Option<HeartbeatMonitorConfig>,
    ) -> Self {
        Self {
            drone_service,
            liveness_cache,
            config: config.unwrap_or_default(),
        }
    }

    /// 运行监控循环，直到收到停止信号。首次扫描在一个间隔之后进行。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动心跳监控，扫描间隔 {:?}，查询超时 {:?}",
            self.config.scan_interval, self.config.check_timeout
        );

        let period = self.config.scan_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出心跳监控");
                    break;
                }
                _ = ticker.tick() => {
                    match self.scan_once(&mut shutdown_rx).await {
                        Ok(report) if report.cancelled => {
                            info!("心跳扫描被中断，退出心跳监控");
                            break;
                        }
                        Ok(report) => {
                            if report.marked_offline > 0 || report.failures > 0 {
                                info!(
                                    "心跳扫描完成: 检查 {}，离线 {}，失败 {}",
                                    report.checked, report.marked_offline, report.failures
                                );
                            } else {
                                debug!("心跳扫描完成: 检查 {}", report.checked);
                            }
                        }
                        Err(e) => error!("查询活跃无人机失败，跳过本轮扫描: {}", e),
                    }
                }
            }
        }
    }

    /// 执行一轮扫描。每处理一架无人机前检查停止信号，收到后立即放弃本轮剩余的无人机。
    pub async fn scan_once(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> DispatchResult<HeartbeatScanReport> {
        let drones = self.drone_service.list_active_drones().await?;
        let mut report = HeartbeatScanReport::default();

        for drone in drones {
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                report.cancelled = true;
                break;
            }

            let alive = match timeout(
                self.config.check_timeout,
                self.liveness_cache.has_heartbeat(drone.id),
            )
            .await
            {
                Ok(Ok(alive)) => alive,
                Ok(Err(e)) => {
                    warn!("查询无人机 {} 心跳失败: {}", drone.id, e);
                    report.failures += 1;
                    continue;
                }
                Err(_) => {
                    warn!("查询无人机 {} 心跳超时", drone.id);
                    report.failures += 1;
                    continue;
                }
            };
            report.checked += 1;

            if alive {
                continue;
            }

            warn!("无人机 {} ({}) 心跳丢失，标记为离线", drone.name, drone.id);
            match self
                .drone_service
                .update_status(drone.id, DroneStatus::Offline)
                .await
            {
                Ok(_) => report.marked_offline += 1,
                Err(e) => {
                    error!("将无人机 {} 标记为离线失败: {}", drone.id, e);
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}
