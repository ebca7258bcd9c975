use async_trait::async_trait;
use dispatch_core::DispatchResult;
use uuid::Uuid;

use crate::entities::{Drone, DroneStatus, Order};
use crate::value_objects::Position;

/// 无人机仓储
#[async_trait]
pub trait DroneRepository: Send + Sync {
    /// 名称重复时返回 `DuplicateDrone`
    async fn create(&self, drone: &Drone) -> DispatchResult<Drone>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Drone>>;
    async fn find_by_name(&self, name: &str) -> DispatchResult<Option<Drone>>;
    async fn find_all(&self) -> DispatchResult<Vec<Drone>>;
    async fn find_idle(&self) -> DispatchResult<Vec<Drone>>;
    /// 空闲或配送中的无人机
    async fn find_active(&self) -> DispatchResult<Vec<Drone>>;

    /// 只写状态列，返回更新后的无人机。不存在时返回 `DroneNotFound`
    async fn update_status(&self, id: Uuid, status: DroneStatus) -> DispatchResult<Drone>;

    /// 只写坐标列，与并发的状态变更互不覆盖。不存在时返回 `DroneNotFound`
    async fn update_position(&self, id: Uuid, position: Position) -> DispatchResult<Drone>;
}

/// 订单仓储
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> DispatchResult<Order>;
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Order>>;
    async fn find_all(&self) -> DispatchResult<Vec<Order>>;
    /// 指派给该无人机且处于 RESERVED / PICKED_UP 的订单
    async fn find_active_by_drone_id(&self, drone_id: Uuid) -> DispatchResult<Option<Order>>;
    /// 不存在时返回 `OrderNotFound`
    async fn update(&self, order: &Order) -> DispatchResult<()>;

    /// 原子领取最早创建的待分配订单并标记为已预留。
    ///
    /// 并发调用方之间互不阻塞，被其他调用方锁定的订单直接跳过，同一订单不会被领取两次。
    /// 没有待分配订单时返回 `NoPendingOrders`。
    async fn claim_next_pending(&self, drone_id: Uuid) -> DispatchResult<Order>;

    /// 撤销领取：仅当订单仍为该无人机的 RESERVED 状态时重置为 PENDING。
    ///
    /// 返回是否实际发生了重置，重复调用是安全的。
    async fn release_claim(&self, order_id: Uuid, drone_id: Uuid) -> DispatchResult<bool>;
}
