use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// 调度错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("订单未找到: {id}")]
    OrderNotFound { id: Uuid },

    #[error("无人机未找到: {id}")]
    DroneNotFound { id: Uuid },

    #[error("无人机未找到: {name}")]
    DroneNameNotFound { name: String },

    #[error("无人机不是空闲状态: {id} (当前状态: {status})")]
    DroneNotIdle { id: Uuid, status: String },

    #[error("无效的状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("无人机名称已存在: {name}")]
    DuplicateDrone { name: String },

    #[error("订单 {id} 只能通过 reserve_job 指派无人机后进入 RESERVED")]
    UnassignedReservation { id: Uuid },

    #[error("订单 {id} 当前状态为 {status}，不允许修改坐标")]
    OrderNotEditable { id: Uuid, status: String },

    #[error("没有待分配的订单")]
    NoPendingOrders,

    #[error("没有空闲的无人机")]
    NoIdleDrones,

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误分类，供传输层映射为可区分的响应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::OrderNotFound { .. }
            | DispatchError::DroneNotFound { .. }
            | DispatchError::DroneNameNotFound { .. } => ErrorKind::NotFound,
            DispatchError::DroneNotIdle { .. }
            | DispatchError::InvalidTransition { .. }
            | DispatchError::DuplicateDrone { .. }
            | DispatchError::OrderNotEditable { .. }
            | DispatchError::UnassignedReservation { .. } => ErrorKind::Conflict,
            DispatchError::NoPendingOrders | DispatchError::NoIdleDrones => ErrorKind::Unavailable,
            DispatchError::Database(_)
            | DispatchError::Cache(_)
            | DispatchError::MessageQueue(_)
            | DispatchError::Serialization(_)
            | DispatchError::Configuration(_)
            | DispatchError::Timeout(_)
            | DispatchError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// 稍后重试可能成功的错误（消息重投递时使用）
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Serialization(_) | DispatchError::Configuration(_) => false,
            other => matches!(other.kind(), ErrorKind::Unavailable | ErrorKind::Internal),
        }
    }

    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        DispatchError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn drone_not_idle(id: Uuid, status: impl fmt::Display) -> Self {
        DispatchError::DroneNotIdle {
            id,
            status: status.to_string(),
        }
    }
}
