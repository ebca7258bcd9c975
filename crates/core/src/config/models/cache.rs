use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 存活缓存（Redis）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 关闭后不启动心跳监控，位置更新也不写缓存
    pub enabled: bool,
    pub redis_url: String,
    /// 心跳标记的过期时间
    pub heartbeat_ttl_seconds: u64,
    /// 位置缓存的过期时间
    pub location_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: "redis://localhost:6379".to_string(),
            heartbeat_ttl_seconds: 30,
            location_ttl_seconds: 60,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.redis_url.is_empty() {
            return Err(anyhow::anyhow!("Redis URL不能为空"));
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis URL必须以redis://或rediss://开头"));
        }

        if self.heartbeat_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("心跳TTL必须大于0"));
        }

        if self.location_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("位置缓存TTL必须大于0"));
        }

        Ok(())
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_seconds)
    }

    pub fn location_ttl(&self) -> Duration {
        Duration::from_secs(self.location_ttl_seconds)
    }
}
