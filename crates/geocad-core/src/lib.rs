//! GeoCAD 核心库
//!
//! 提供图纸地理参照所需的基础设施：
//! - `Drawing` / `Layer` / `Entity` / `EntityData` 记录模型
//! - WGS84 与 UTM 投影坐标系之间的变换
//! - 图纸本地坐标系 (WCS) 的仿射锚定
//! - CAD 默认颜色表
//! - 内存记录仓库（get-or-create、唯一约束、级联删除、事务）
//!
//! # 架构设计
//!
//! 记录模型：
//! - `Drawing`: 一张图纸及其地理参照状态
//! - `Layer`: 图层，或复用为块模板 (`is_block`)
//! - `Entity`: 提取出的要素（图层聚合、分类多边形、块插入）
//! - `EntityData`: 挂在要素上的键值属性
//!
//! # 示例
//!
//! ```rust
//! use geocad_core::prelude::*;
//!
//! // 为罗马附近的图纸解析UTM带
//! let epsg = resolve_utm_epsg(&Wgs84UtmCatalog, 12.0, 42.0).unwrap();
//! assert_eq!(epsg, 32633);
//! ```

pub mod color;
pub mod crs;
pub mod error;
pub mod model;
pub mod store;
pub mod transform;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::color::{aci_to_hex, rgb_to_hex};
    pub use crate::crs::{resolve_utm_epsg, CrsCatalog, Wgs84UtmCatalog};
    pub use crate::error::{CrsError, StoreError};
    pub use crate::model::{
        Drawing, DrawingId, Entity, EntityData, EntityDataId, EntityId, GeoSnapshot, Layer,
        LayerId,
    };
    pub use crate::store::MemoryStore;
    pub use crate::transform::{DrawingTransforms, Projection, WcsTransform};
}
