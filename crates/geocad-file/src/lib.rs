//! GeoCAD 文件层
//!
//! - `.dxf` 读写，实体/图层/块/插入经 `dxf` crate 暴露
//! - GEODATA 对象经原始组码层解析与拼接
//!   （codec 不可靠覆盖的对象自己解析，与布局/视口同一套路）
//! - DXF 实体到平面几何的转换

pub mod convert;
pub mod document;
pub mod error;
pub mod geodata;
pub mod raw;

pub use document::{CadDocument, InsertRef, LayerInfo, TextItem};
pub use error::FileError;
pub use geodata::GeoData;
pub use raw::{DxfPair, RawDxf};
