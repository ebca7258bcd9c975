use async_trait::async_trait;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{entities::Order, repositories::OrderRepository, value_objects::Position};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, status, origin_lat, origin_lon, dest_lat, dest_lon, drone_id, created_at, updated_at";

/// PostgreSQL订单仓储实现
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &sqlx::postgres::PgRow) -> DispatchResult<Order> {
        Ok(Order {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            origin: Position::new(row.try_get("origin_lat")?, row.try_get("origin_lon")?),
            destination: Position::new(row.try_get("dest_lat")?, row.try_get("dest_lon")?),
            drone_id: row.try_get("drone_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(&self, order: &Order) -> DispatchResult<Order> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, status, origin_lat, origin_lon, dest_lat, dest_lon, drone_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id)
        .bind(order.status)
        .bind(order.origin.latitude)
        .bind(order.origin.longitude)
        .bind(order.destination.latitude)
        .bind(order.destination.longitude)
        .bind(order.drone_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!("创建订单成功: {}", order.id);
        Self::row_to_order(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_all(&self) -> DispatchResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn find_active_by_drone_id(&self, drone_id: Uuid) -> DispatchResult<Option<Order>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE drone_id = $1 AND status IN ('RESERVED', 'PICKED_UP')
            LIMIT 1
            "#
        ))
        .bind(drone_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn update(&self, order: &Order) -> DispatchResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, origin_lat = $3, origin_lon = $4, dest_lat = $5, dest_lon = $6,
                drone_id = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status)
        .bind(order.origin.latitude)
        .bind(order.origin.longitude)
        .bind(order.destination.latitude)
        .bind(order.destination.longitude)
        .bind(order.drone_id)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::OrderNotFound { id: order.id });
        }

        debug!("更新订单成功: {} -> {}", order.id, order.status);
        Ok(())
    }

    async fn claim_next_pending(&self, drone_id: Uuid) -> DispatchResult<Order> {
        // 单条语句完成选取和更新，SKIP LOCKED 让并发领取方跳过彼此锁定的行
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = 'RESERVED', drone_id = $1, updated_at = NOW()
            WHERE status = 'PENDING' AND id = (
                SELECT id FROM orders
                WHERE status = 'PENDING'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(drone_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let order = Self::row_to_order(&row)?;
                info!("无人机 {} 领取订单 {}", drone_id, order.id);
                Ok(order)
            }
            None => Err(DispatchError::NoPendingOrders),
        }
    }

    async fn release_claim(&self, order_id: Uuid, drone_id: Uuid) -> DispatchResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'PENDING', drone_id = NULL, updated_at = NOW()
            WHERE id = $1 AND drone_id = $2 AND status = 'RESERVED'
            "#,
        )
        .bind(order_id)
        .bind(drone_id)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected() > 0;
        debug!(
            "撤销订单 {} 的领取 (无人机 {}): {}",
            order_id, drone_id, released
        );
        Ok(released)
    }
}
