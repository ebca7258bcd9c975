use std::time::Duration;

use async_trait::async_trait;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{
    ports::cache::{heartbeat_key, location_key},
    LivenessCache, Position,
};
use redis::aio::ConnectionManager;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const HEARTBEAT_VALUE: &str = "alive";

/// 基于Redis的存活缓存
///
/// 键格式：`drone:{id}:heartbeat`（值为 `alive`）和 `drone:{id}:location`（值为 `"{lat},{lon}"`）。
#[derive(Clone)]
pub struct RedisLivenessCache {
    conn: ConnectionManager,
}

impl RedisLivenessCache {
    pub async fn new(redis_url: &str) -> DispatchResult<Self> {
        info!("连接Redis: {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| DispatchError::Cache(format!("无效的Redis地址: {e}")))?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| DispatchError::Cache(format!("连接Redis失败: {e}")))?;

        let cache = Self { conn };
        if !cache.health_check().await? {
            return Err(DispatchError::Cache("Redis PING未返回PONG".to_string()));
        }

        info!("Redis连接成功");
        Ok(cache)
    }

    pub async fn health_check(&self) -> DispatchResult<bool> {
        let mut conn = self.conn.clone();
        let result: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Cache(format!("Redis PING失败: {e}")))?;
        Ok(result == "PONG")
    }

    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl LivenessCache for RedisLivenessCache {
    #[instrument(skip(self))]
    async fn set_heartbeat(&self, drone_id: Uuid, ttl: Duration) -> DispatchResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SETEX")
            .arg(heartbeat_key(drone_id))
            .arg(Self::ttl_seconds(ttl))
            .arg(HEARTBEAT_VALUE)
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Cache(format!("写入心跳失败: {e}")))?;

        debug!("刷新无人机 {} 心跳", drone_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn has_heartbeat(&self, drone_id: Uuid) -> DispatchResult<bool> {
        let mut conn = self.conn.clone();
        let exists: i32 = redis::cmd("EXISTS")
            .arg(heartbeat_key(drone_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Cache(format!("查询心跳失败: {e}")))?;

        Ok(exists > 0)
    }

    #[instrument(skip(self))]
    async fn set_position(
        &self,
        drone_id: Uuid,
        position: Position,
        ttl: Duration,
    ) -> DispatchResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SETEX")
            .arg(location_key(drone_id))
            .arg(Self::ttl_seconds(ttl))
            .arg(position.to_cache_value())
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Cache(format!("写入位置失败: {e}")))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_position(&self, drone_id: Uuid) -> DispatchResult<Option<Position>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(location_key(drone_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| DispatchError::Cache(format!("读取位置失败: {e}")))?;

        value.map(|v| v.parse::<Position>()).transpose()
    }
}
