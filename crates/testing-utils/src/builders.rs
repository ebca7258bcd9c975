//! Test data builders for creating test entities

use chrono::{DateTime, Utc};
use dispatch_domain::{Drone, DroneStatus, Order, OrderStatus, Position};
use uuid::Uuid;

/// Builder for creating test Drone entities
pub struct DroneBuilder {
    drone: Drone,
}

impl DroneBuilder {
    pub fn new() -> Self {
        Self {
            drone: Drone::new("test-drone"),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.drone.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.drone.name = name.to_string();
        self
    }

    pub fn with_status(mut self, status: DroneStatus) -> Self {
        self.drone.status = status;
        self
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.drone.position = Position::new(latitude, longitude);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.drone.created_at = created_at;
        self.drone.updated_at = created_at;
        self
    }

    pub fn delivering(self) -> Self {
        self.with_status(DroneStatus::Delivering)
    }

    pub fn build(self) -> Drone {
        self.drone
    }
}

impl Default for DroneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Order entities
pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    pub fn new() -> Self {
        Self {
            order: Order::new(Position::new(10.0, 10.0), Position::new(20.0, 20.0)),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.order.id = id;
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.order.status = status;
        self
    }

    pub fn from(mut self, latitude: f64, longitude: f64) -> Self {
        self.order.origin = Position::new(latitude, longitude);
        self
    }

    pub fn to(mut self, latitude: f64, longitude: f64) -> Self {
        self.order.destination = Position::new(latitude, longitude);
        self
    }

    pub fn with_drone(mut self, drone_id: Uuid) -> Self {
        self.order.drone_id = Some(drone_id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.order.created_at = created_at;
        self.order.updated_at = created_at;
        self
    }

    /// RESERVED 并指派给该无人机
    pub fn reserved_by(self, drone_id: Uuid) -> Self {
        self.with_status(OrderStatus::Reserved).with_drone(drone_id)
    }

    /// PICKED_UP 并指派给该无人机
    pub fn picked_up_by(self, drone_id: Uuid) -> Self {
        self.with_status(OrderStatus::PickedUp).with_drone(drone_id)
    }

    pub fn build(self) -> Order {
        self.order
    }
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
