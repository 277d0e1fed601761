//! GeoCAD 引擎
//!
//! 把文件层与核心层接成完整的地理参照流水线：
//!
//! ```text
//! 生命周期编排 → CRS解析 → 变换构建 → 地理数据写回 → 几何提取
//! ```
//!
//! 每个箭头都是硬依赖：没有解析出的坐标系与变换，提取不会运行。

pub mod error;
pub mod export;
pub mod extract;
pub mod popup;
pub mod resolve;
pub mod service;

pub use error::EngineError;
pub use popup::{entity_popup, Popup};
pub use service::{GeoreferenceService, DEFAULT_BLOCK_BLACKLIST, DEFAULT_LAYER_BLACKLIST};
