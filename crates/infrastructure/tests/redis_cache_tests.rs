use std::time::Duration;

use anyhow::Result;
use dispatch_domain::{LivenessCache, Position};
use dispatch_infrastructure::RedisLivenessCache;
use testcontainers::{runners::AsyncRunner, ImageExt};
use testcontainers_modules::redis::Redis;
use tokio::time::sleep;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_heartbeat_and_position_expire() -> Result<()> {
    let container = Redis::default().with_tag("7-alpine").start().await?;
    let port = container.get_host_port_ipv4(6379).await?;
    let cache = RedisLivenessCache::new(&format!("redis://localhost:{port}")).await?;
    assert!(cache.health_check().await?);

    let drone_id = Uuid::new_v4();
    assert!(!cache.has_heartbeat(drone_id).await?);
    assert_eq!(cache.get_position(drone_id).await?, None);

    cache.set_heartbeat(drone_id, Duration::from_secs(1)).await?;
    cache
        .set_position(drone_id, Position::new(15.0, 12.0), Duration::from_secs(1))
        .await?;
    assert!(cache.has_heartbeat(drone_id).await?);
    assert_eq!(
        cache.get_position(drone_id).await?,
        Some(Position::new(15.0, 12.0))
    );

    sleep(Duration::from_millis(2100)).await;
    assert!(!cache.has_heartbeat(drone_id).await?);
    assert_eq!(cache.get_position(drone_id).await?, None);
    Ok(())
}
