use async_trait::async_trait;
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_domain::{
    entities::{Drone, DroneStatus},
    repositories::DroneRepository,
    value_objects::Position,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const DRONE_COLUMNS: &str = "id, name, status, latitude, longitude, created_at, updated_at";

/// PostgreSQL无人机仓储实现
pub struct PostgresDroneRepository {
    pool: PgPool,
}

impl PostgresDroneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_drone(row: &sqlx::postgres::PgRow) -> DispatchResult<Drone> {
        Ok(Drone {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            position: Position::new(row.try_get("latitude")?, row.try_get("longitude")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn find_by_statuses(&self, statuses: &[DroneStatus]) -> DispatchResult<Vec<Drone>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones WHERE status = ANY($1) ORDER BY created_at ASC, name ASC"
        ))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_drone).collect()
    }
}

#[async_trait]
impl DroneRepository for PostgresDroneRepository {
    async fn create(&self, drone: &Drone) -> DispatchResult<Drone> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO drones (id, name, status, latitude, longitude, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {DRONE_COLUMNS}
            "#
        ))
        .bind(drone.id)
        .bind(&drone.name)
        .bind(drone.status)
        .bind(drone.position.latitude)
        .bind(drone.position.longitude)
        .bind(drone.created_at)
        .bind(drone.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DispatchError::DuplicateDrone {
                    name: drone.name.clone(),
                }
            }
            other => DispatchError::Database(other),
        })?;

        debug!("注册无人机成功: {} ({})", drone.name, drone.id);
        Self::row_to_drone(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Drone>> {
        let row = sqlx::query(&format!("SELECT {DRONE_COLUMNS} FROM drones WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_drone).transpose()
    }

    async fn find_by_name(&self, name: &str) -> DispatchResult<Option<Drone>> {
        let row = sqlx::query(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_drone).transpose()
    }

    async fn find_all(&self) -> DispatchResult<Vec<Drone>> {
        let rows = sqlx::query(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_drone).collect()
    }

    async fn find_idle(&self) -> DispatchResult<Vec<Drone>> {
        self.find_by_statuses(&[DroneStatus::Idle]).await
    }

    async fn find_active(&self) -> DispatchResult<Vec<Drone>> {
        self.find_by_statuses(&[DroneStatus::Idle, DroneStatus::Delivering])
            .await
    }

    async fn update_status(&self, id: Uuid, status: DroneStatus) -> DispatchResult<Drone> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE drones
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {DRONE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DispatchError::DroneNotFound { id })?;

        debug!("更新无人机状态成功: {} -> {}", id, status);
        Self::row_to_drone(&row)
    }

    async fn update_position(&self, id: Uuid, position: Position) -> DispatchResult<Drone> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE drones
            SET latitude = $2, longitude = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {DRONE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(position.latitude)
        .bind(position.longitude)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DispatchError::DroneNotFound { id })?;

        debug!("更新无人机位置成功: {} -> {}", id, position);
        Self::row_to_drone(&row)
    }
}
