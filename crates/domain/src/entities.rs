use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use dispatch_core::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::Position;

/// 无人机状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DroneStatus {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "DELIVERING")]
    Delivering,
    #[serde(rename = "BROKEN")]
    Broken,
    #[serde(rename = "OFFLINE")]
    Offline,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Idle => "IDLE",
            DroneStatus::Delivering => "DELIVERING",
            DroneStatus::Broken => "BROKEN",
            DroneStatus::Offline => "OFFLINE",
        }
    }

    /// 心跳监控只扫描处于活跃状态的无人机
    pub fn is_active(&self) -> bool {
        matches!(self, DroneStatus::Idle | DroneStatus::Delivering)
    }
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DroneStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> DispatchResult<Self> {
        match s {
            "IDLE" => Ok(DroneStatus::Idle),
            "DELIVERING" => Ok(DroneStatus::Delivering),
            "BROKEN" => Ok(DroneStatus::Broken),
            "OFFLINE" => Ok(DroneStatus::Offline),
            _ => Err(DispatchError::Serialization(format!(
                "Invalid drone status: {s}"
            ))),
        }
    }
}

/// 订单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RESERVED")]
    Reserved,
    #[serde(rename = "PICKED_UP")]
    PickedUp,
    #[serde(rename = "DELIVERED")]
    Delivered,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Reserved,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// 已分配给无人机且尚未结束
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::PickedUp)
    }

    /// 订单生命周期状态机的转换表
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Reserved)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Reserved, OrderStatus::PickedUp)
                | (OrderStatus::Reserved, OrderStatus::Cancelled)
                | (OrderStatus::PickedUp, OrderStatus::Delivered)
                | (OrderStatus::PickedUp, OrderStatus::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> DispatchResult<Self> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "RESERVED" => Ok(OrderStatus::Reserved),
            "PICKED_UP" => Ok(OrderStatus::PickedUp),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "FAILED" => Ok(OrderStatus::Failed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(DispatchError::Serialization(format!(
                "Invalid order status: {s}"
            ))),
        }
    }
}

/// 无人机实体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drone {
    pub id: Uuid,
    pub name: String,
    pub status: DroneStatus,
    pub position: Position,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Drone {
    /// 新注册的无人机为空闲状态，位于原点
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: DroneStatus::Idle,
            position: Position::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == DroneStatus::Idle
    }

    pub fn set_status(&mut self, status: DroneStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn move_to(&mut self, position: Position) {
        self.position = position;
        self.updated_at = Utc::now();
    }
}

/// 配送订单实体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub origin: Position,
    pub destination: Position,
    pub drone_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(origin: Position, destination: Position) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            origin,
            destination,
            drone_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 按转换表推进状态。进入终态时清除指派的无人机，失败时订单保持不变。
    pub fn transition_to(&mut self, target: OrderStatus) -> DispatchResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(DispatchError::invalid_transition(self.status, target));
        }

        self.status = target;
        if target.is_terminal() {
            self.drone_id = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 将进行中的订单重新开放，从无人机最后的位置重新取货
    pub fn reopen_at(&mut self, position: Position) {
        self.origin = position;
        self.drone_id = None;
        self.status = OrderStatus::Pending;
        self.updated_at = Utc::now();
    }

    pub fn update_coordinates(
        &mut self,
        origin: Position,
        destination: Position,
    ) -> DispatchResult<()> {
        if self.status != OrderStatus::Pending {
            return Err(DispatchError::OrderNotEditable {
                id: self.id,
                status: self.status.to_string(),
            });
        }

        self.origin = origin;
        self.destination = destination;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_assigned_to(&self, drone_id: Uuid) -> bool {
        self.drone_id == Some(drone_id)
    }
}
