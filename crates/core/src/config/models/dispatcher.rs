use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub heartbeat_monitor_enabled: bool,
    /// 心跳扫描间隔（秒）
    pub heartbeat_scan_interval_seconds: u64,
    /// 单架无人机心跳查询超时（毫秒）
    pub heartbeat_check_timeout_millis: u64,
    pub dispatch_worker_enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat_monitor_enabled: true,
            heartbeat_scan_interval_seconds: 10,
            heartbeat_check_timeout_millis: 2000,
            dispatch_worker_enabled: true,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_scan_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳扫描间隔必须大于0"));
        }

        if self.heartbeat_check_timeout_millis == 0 {
            return Err(anyhow::anyhow!("心跳查询超时必须大于0"));
        }

        if self.heartbeat_check_timeout_millis >= self.heartbeat_scan_interval_seconds * 1000 {
            return Err(anyhow::anyhow!("心跳查询超时必须小于扫描间隔"));
        }

        Ok(())
    }

    pub fn heartbeat_scan_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_scan_interval_seconds)
    }

    pub fn heartbeat_check_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_check_timeout_millis)
    }
}
