//! 核心错误定义

use thiserror::Error;

use crate::model::DrawingId;

/// 坐标参照系统相关错误
#[derive(Error, Debug)]
pub enum CrsError {
    /// 对有效经纬度不应发生，但必须处理
    #[error("no UTM candidate CRS for point ({lon}, {lat})")]
    NoUtmCandidate { lon: f64, lat: f64 },

    #[error("unsupported CRS: EPSG {0}")]
    UnsupportedCrs(u32),

    #[error("projection failed: {0}")]
    Projection(String),
}

/// 记录仓库错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate layer name {name:?} (drawing {drawing}, is_block {is_block})")]
    UniqueViolation {
        drawing: DrawingId,
        name: String,
        is_block: bool,
    },

    #[error("{0} not found: {1}")]
    NotFound(&'static str, u64),
}
