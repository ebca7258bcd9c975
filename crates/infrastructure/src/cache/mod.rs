pub mod redis_liveness_cache;

pub use redis_liveness_cache::RedisLivenessCache;
