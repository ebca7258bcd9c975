//! 领域事件
//!
//! 通过消息总线发布，用于触发异步调度

use chrono::{DateTime, Utc};
use dispatch_core::{DispatchError, DispatchResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Order;

pub const ORDER_CREATED_ROUTING_KEY: &str = "order.created";

/// 领域事件基础trait
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync {
    fn event_type(&self) -> &'static str;
    fn routing_key(&self) -> &'static str;
    fn aggregate_id(&self) -> Uuid;
    fn occurred_at(&self) -> DateTime<Utc>;

    /// JSON编码后的消息体
    fn to_payload(&self) -> DispatchResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            DispatchError::Serialization(format!("序列化事件 {} 失败: {e}", self.event_type()))
        })
    }

    fn from_payload(payload: &[u8]) -> DispatchResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| DispatchError::Serialization(format!("反序列化事件失败: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub dest_lat: f64,
    pub dest_lon: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            origin_lat: order.origin.latitude,
            origin_lon: order.origin.longitude,
            dest_lat: order.destination.latitude,
            dest_lon: order.destination.longitude,
            timestamp: Utc::now(),
        }
    }
}

impl DomainEvent for OrderCreatedEvent {
    fn event_type(&self) -> &'static str {
        "OrderCreated"
    }

    fn routing_key(&self) -> &'static str {
        ORDER_CREATED_ROUTING_KEY
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
