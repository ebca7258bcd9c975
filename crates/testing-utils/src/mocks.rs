//! Mock implementations for the repository and port traits
//!
//! In-memory implementations that can be used for unit testing without
//! requiring actual database, cache or broker connections. Each mock can be
//! told to fail specific calls so error paths are testable.

use async_trait::async_trait;
use chrono::Utc;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{
    Drone, DroneRepository, DroneStatus, DroneStatusObserver, LivenessCache, MessageBus,
    MessageHandler, Order, OrderRepository, OrderStatus, Position,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Mock implementation of DroneRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockDroneRepository {
    drones: Arc<Mutex<HashMap<Uuid, Drone>>>,
    /// 更新为该状态时返回错误
    fail_update_to: Arc<Mutex<Option<DroneStatus>>>,
    fail_find_active: Arc<AtomicBool>,
    update_calls: Arc<AtomicUsize>,
}

impl MockDroneRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drones(drones: Vec<Drone>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.drones.lock().unwrap();
            for drone in drones {
                map.insert(drone.id, drone);
            }
        }
        repo
    }

    pub fn get(&self, id: Uuid) -> Option<Drone> {
        self.drones.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.drones.lock().unwrap().len()
    }

    pub fn fail_updates_to(&self, status: DroneStatus) {
        *self.fail_update_to.lock().unwrap() = Some(status);
    }

    pub fn set_fail_find_active(&self, fail: bool) {
        self.fail_find_active.store(fail, Ordering::SeqCst);
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn sorted(&self, filter: impl Fn(&Drone) -> bool) -> Vec<Drone> {
        let mut drones: Vec<Drone> = self
            .drones
            .lock()
            .unwrap()
            .values()
            .filter(|d| filter(d))
            .cloned()
            .collect();
        drones.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        drones
    }
}

#[async_trait]
impl DroneRepository for MockDroneRepository {
    async fn create(&self, drone: &Drone) -> DispatchResult<Drone> {
        let mut drones = self.drones.lock().unwrap();
        if drones.values().any(|d| d.name == drone.name) {
            return Err(DispatchError::DuplicateDrone {
                name: drone.name.clone(),
            });
        }
        drones.insert(drone.id, drone.clone());
        Ok(drone.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Drone>> {
        Ok(self.get(id))
    }

    async fn find_by_name(&self, name: &str) -> DispatchResult<Option<Drone>> {
        let drones = self.drones.lock().unwrap();
        Ok(drones.values().find(|d| d.name == name).cloned())
    }

    async fn find_all(&self) -> DispatchResult<Vec<Drone>> {
        Ok(self.sorted(|_| true))
    }

    async fn find_idle(&self) -> DispatchResult<Vec<Drone>> {
        Ok(self.sorted(|d| d.status == DroneStatus::Idle))
    }

    async fn find_active(&self) -> DispatchResult<Vec<Drone>> {
        if self.fail_find_active.load(Ordering::SeqCst) {
            return Err(DispatchError::Internal("injected find_active failure".to_string()));
        }
        Ok(self.sorted(|d| d.status.is_active()))
    }

    async fn update_status(&self, id: Uuid, status: DroneStatus) -> DispatchResult<Drone> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_update_to.lock().unwrap() == Some(status) {
            return Err(DispatchError::Internal(format!(
                "injected update failure for status {}",
                status
            )));
        }

        let mut drones = self.drones.lock().unwrap();
        let drone = drones
            .get_mut(&id)
            .ok_or(DispatchError::DroneNotFound { id })?;
        drone.set_status(status);
        Ok(drone.clone())
    }

    async fn update_position(&self, id: Uuid, position: Position) -> DispatchResult<Drone> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let mut drones = self.drones.lock().unwrap();
        let drone = drones
            .get_mut(&id)
            .ok_or(DispatchError::DroneNotFound { id })?;
        drone.move_to(position);
        Ok(drone.clone())
    }
}

/// Mock implementation of OrderRepository for testing
///
/// 领取操作在同一把锁内完成选取和更新，与数据库的 SKIP LOCKED 语义一致。
#[derive(Debug, Clone, Default)]
pub struct MockOrderRepository {
    orders: Arc<Mutex<HashMap<Uuid, Order>>>,
    fail_updates: Arc<AtomicBool>,
    fail_find_active: Arc<AtomicBool>,
    fail_release: Arc<AtomicBool>,
    find_active_calls: Arc<AtomicUsize>,
    release_calls: Arc<AtomicUsize>,
}

impl MockOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: Vec<Order>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.orders.lock().unwrap();
            for order in orders {
                map.insert(order.id, order);
            }
        }
        repo
    }

    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }

    pub fn get_all_orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().values().cloned().collect()
    }

    pub fn count_with_status(&self, status: OrderStatus) -> usize {
        self.orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status == status)
            .count()
    }

    /// 直接修改存储中的订单，模拟并发方的写入
    pub fn modify(&self, id: Uuid, f: impl FnOnce(&mut Order)) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id) {
            f(order);
        }
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_find_active(&self, fail: bool) {
        self.fail_find_active.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn find_active_calls(&self) -> usize {
        self.find_active_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderRepository for MockOrderRepository {
    async fn create(&self, order: &Order) -> DispatchResult<Order> {
        self.orders.lock().unwrap().insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Order>> {
        Ok(self.get(id))
    }

    async fn find_all(&self) -> DispatchResult<Vec<Order>> {
        let mut orders = self.get_all_orders();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn find_active_by_drone_id(&self, drone_id: Uuid) -> DispatchResult<Option<Order>> {
        self.find_active_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find_active.load(Ordering::SeqCst) {
            return Err(DispatchError::Internal(
                "injected find_active_by_drone_id failure".to_string(),
            ));
        }

        let orders = self.orders.lock().unwrap();
        Ok(orders
            .values()
            .find(|o| o.is_assigned_to(drone_id) && o.status.is_active())
            .cloned())
    }

    async fn update(&self, order: &Order) -> DispatchResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DispatchError::Internal("injected order update failure".to_string()));
        }

        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(DispatchError::OrderNotFound { id: order.id }),
        }
    }

    async fn claim_next_pending(&self, drone_id: Uuid) -> DispatchResult<Order> {
        // 让出调度，使并发领取真正交错
        tokio::task::yield_now().await;
        let mut orders = self.orders.lock().unwrap();
        let next = orders
            .values_mut()
            .filter(|o| o.status == OrderStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .ok_or(DispatchError::NoPendingOrders)?;

        next.status = OrderStatus::Reserved;
        next.drone_id = Some(drone_id);
        next.updated_at = Utc::now();
        Ok(next.clone())
    }

    async fn release_claim(&self, order_id: Uuid, drone_id: Uuid) -> DispatchResult<bool> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(DispatchError::Internal("injected release failure".to_string()));
        }

        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&order_id) {
            Some(order)
                if order.status == OrderStatus::Reserved && order.is_assigned_to(drone_id) =>
            {
                order.status = OrderStatus::Pending;
                order.drone_id = None;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Mock implementation of LivenessCache for testing
///
/// TTL不生效，通过 `expire_heartbeat` 手动让心跳过期。
#[derive(Debug, Clone, Default)]
pub struct MockLivenessCache {
    heartbeats: Arc<Mutex<HashSet<Uuid>>>,
    positions: Arc<Mutex<HashMap<Uuid, Position>>>,
    failing: Arc<Mutex<HashSet<Uuid>>>,
    slow: Arc<Mutex<HashMap<Uuid, Duration>>>,
    fail_writes: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
}

impl MockLivenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeats(drone_ids: &[Uuid]) -> Self {
        let cache = Self::new();
        cache.heartbeats.lock().unwrap().extend(drone_ids.iter().copied());
        cache
    }

    pub fn expire_heartbeat(&self, drone_id: Uuid) {
        self.heartbeats.lock().unwrap().remove(&drone_id);
    }

    pub fn heartbeat_present(&self, drone_id: Uuid) -> bool {
        self.heartbeats.lock().unwrap().contains(&drone_id)
    }

    pub fn cached_position(&self, drone_id: Uuid) -> Option<Position> {
        self.positions.lock().unwrap().get(&drone_id).copied()
    }

    /// 查询该无人机的心跳时返回错误
    pub fn fail_checks_for(&self, drone_id: Uuid) {
        self.failing.lock().unwrap().insert(drone_id);
    }

    /// 查询该无人机的心跳前先等待一段时间
    pub fn delay_checks_for(&self, drone_id: Uuid, delay: Duration) {
        self.slow.lock().unwrap().insert(drone_id, delay);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessCache for MockLivenessCache {
    async fn set_heartbeat(&self, drone_id: Uuid, _ttl: Duration) -> DispatchResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DispatchError::Cache("injected heartbeat write failure".to_string()));
        }
        self.heartbeats.lock().unwrap().insert(drone_id);
        Ok(())
    }

    async fn has_heartbeat(&self, drone_id: Uuid) -> DispatchResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        let delay = self.slow.lock().unwrap().get(&drone_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&drone_id) {
            return Err(DispatchError::Cache(format!(
                "injected heartbeat check failure for {drone_id}"
            )));
        }
        Ok(self.heartbeat_present(drone_id))
    }

    async fn set_position(
        &self,
        drone_id: Uuid,
        position: Position,
        _ttl: Duration,
    ) -> DispatchResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DispatchError::Cache("injected position write failure".to_string()));
        }
        self.positions.lock().unwrap().insert(drone_id, position);
        Ok(())
    }

    async fn get_position(&self, drone_id: Uuid) -> DispatchResult<Option<Position>> {
        Ok(self.cached_position(drone_id))
    }
}

/// Mock implementation of MessageBus for testing
///
/// 记录发布的消息，订阅的处理器可通过 `deliver` 手动投递。
#[derive(Clone, Default)]
pub struct MockMessageBus {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    handlers: Arc<Mutex<Vec<(String, String, Arc<dyn MessageHandler>)>>>,
    fail_publish: Arc<AtomicBool>,
    publish_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(queue, key, _)| (queue.clone(), key.clone()))
            .collect()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock().unwrap() = Some(delay);
    }

    /// 把消息交给绑定到该路由键的第一个处理器，返回处理结果（Err 即会被重新投递）
    pub async fn deliver(&self, routing_key: &str, payload: &[u8]) -> DispatchResult<()> {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .find(|(_, key, _)| key == routing_key)
            .map(|(_, _, handler)| Arc::clone(handler))
            .ok_or_else(|| {
                DispatchError::MessageQueue(format!("no subscriber for {routing_key}"))
            })?;
        handler.handle(payload).await
    }
}

#[async_trait]
impl MessageBus for MockMessageBus {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> DispatchResult<()> {
        let delay = *self.publish_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(DispatchError::MessageQueue("injected publish failure".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> DispatchResult<()> {
        self.handlers
            .lock()
            .unwrap()
            .push((queue.to_string(), routing_key.to_string(), handler));
        Ok(())
    }
}

/// 一次状态变更通知
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChangeRecord {
    pub drone_id: Uuid,
    pub old_status: DroneStatus,
    pub new_status: DroneStatus,
    pub position: Position,
}

/// 记录所有收到的状态变更通知，可共享一个调用序列以验证多个观察者的调用顺序
#[derive(Debug, Clone)]
pub struct RecordingObserver {
    name: String,
    records: Arc<Mutex<Vec<StatusChangeRecord>>>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn new(name: &str) -> Self {
        Self::with_call_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_call_log(name: &str, call_log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            records: Arc::new(Mutex::new(Vec::new())),
            call_log,
        }
    }

    pub fn records(&self) -> Vec<StatusChangeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DroneStatusObserver for RecordingObserver {
    async fn on_status_changed(
        &self,
        drone_id: Uuid,
        old_status: DroneStatus,
        new_status: DroneStatus,
        last_position: Position,
    ) {
        self.records.lock().unwrap().push(StatusChangeRecord {
            drone_id,
            old_status,
            new_status,
            position: last_position,
        });
        self.call_log.lock().unwrap().push(self.name.clone());
    }
}
