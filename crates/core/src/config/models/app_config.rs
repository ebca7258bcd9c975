use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    cache::CacheConfig, database::DatabaseConfig, dispatcher::DispatcherConfig,
    logging::LoggingConfig, message_queue::MessageQueueConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub message_queue: MessageQueueConfig,
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: DISPATCH_, nesting separator: __)
    ///
    /// `config_path` 为None时依次尝试默认路径，都不存在则只使用默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Self::with_defaults(ConfigBuilder::builder())?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = [
                "config/dispatch.toml",
                "dispatch.toml",
                "/etc/drone-dispatch/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        // 环境变量优先级最高，例如 DISPATCH_DATABASE__URL
        builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = AppConfig::default();
        let builder = builder
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", defaults.database.max_connections as i64)?
            .set_default("database.min_connections", defaults.database.min_connections as i64)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds as i64,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds as i64,
            )?
            .set_default("cache.enabled", defaults.cache.enabled)?
            .set_default("cache.redis_url", defaults.cache.redis_url)?
            .set_default(
                "cache.heartbeat_ttl_seconds",
                defaults.cache.heartbeat_ttl_seconds as i64,
            )?
            .set_default(
                "cache.location_ttl_seconds",
                defaults.cache.location_ttl_seconds as i64,
            )?
            .set_default("message_queue.enabled", defaults.message_queue.enabled)?
            .set_default("message_queue.type", "rabbitmq")?
            .set_default("message_queue.url", defaults.message_queue.url)?
            .set_default("message_queue.exchange", defaults.message_queue.exchange)?
            .set_default(
                "message_queue.dispatch_queue",
                defaults.message_queue.dispatch_queue,
            )?
            .set_default(
                "message_queue.order_created_routing_key",
                defaults.message_queue.order_created_routing_key,
            )?
            .set_default(
                "message_queue.publish_timeout_seconds",
                defaults.message_queue.publish_timeout_seconds as i64,
            )?
            .set_default(
                "message_queue.redelivery_delay_millis",
                defaults.message_queue.redelivery_delay_millis as i64,
            )?
            .set_default(
                "dispatcher.heartbeat_monitor_enabled",
                defaults.dispatcher.heartbeat_monitor_enabled,
            )?
            .set_default(
                "dispatcher.heartbeat_scan_interval_seconds",
                defaults.dispatcher.heartbeat_scan_interval_seconds as i64,
            )?
            .set_default(
                "dispatcher.heartbeat_check_timeout_millis",
                defaults.dispatcher.heartbeat_check_timeout_millis as i64,
            )?
            .set_default(
                "dispatcher.dispatch_worker_enabled",
                defaults.dispatcher.dispatch_worker_enabled,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format.to_string())?;
        Ok(builder)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.message_queue
            .validate()
            .context("消息队列配置验证失败")?;
        self.dispatcher.validate().context("调度器配置验证失败")?;
        self.logging.validate().context("日志配置验证失败")?;
        Ok(())
    }
}
