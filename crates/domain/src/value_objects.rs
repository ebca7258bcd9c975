use std::fmt;
use std::str::FromStr;

use dispatch_core::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};

/// 地理坐标
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 缓存中的存储格式 `"{lat},{lon}"`
    pub fn to_cache_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

impl FromStr for Position {
    type Err = DispatchError;

    fn from_str(s: &str) -> DispatchResult<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| DispatchError::Serialization(format!("无效的坐标格式: {s}")))?;

        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| DispatchError::Serialization(format!("无效的纬度 {lat}: {e}")))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| DispatchError::Serialization(format!("无效的经度 {lon}: {e}")))?;

        Ok(Self::new(latitude, longitude))
    }
}
