//! 记录模型
//!
//! 图纸 (Drawing) 独占其图层 (Layer)，图层独占其要素 (Entity)，
//! 要素独占其属性 (EntityData)。块模板是带 `is_block` 标记的图层，
//! 被插入要素以非独占方式引用。

use std::path::PathBuf;

use geo::{GeometryCollection, Point};
use serde::{Deserialize, Serialize};

pub type DrawingId = u64;
pub type LayerId = u64;
pub type EntityId = u64;
pub type EntityDataId = u64;

/// 地理参照字段在装载时的快照
///
/// 保存时逐字段与当前值比较，决定是否触发重新提取。
/// 显式快照代替隐式的对象变更跟踪。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoSnapshot {
    pub dxf_path: PathBuf,
    pub origin: Option<Point<f64>>,
    pub design_x: f64,
    pub design_y: f64,
    pub rotation: f64,
}

/// 图纸：一个CAD源文件及其地理参照状态
///
/// `epsg` 为空表示尚未参照，这是合法的终态而非错误。
/// 一旦解析完成，`epsg` 只能由显式触发（新父图纸、原点变更、
/// DXF替换、设计点/旋转变更）重新推导。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drawing {
    pub id: DrawingId,
    pub title: String,
    /// 存储的DXF文件路径，由图纸独占
    pub dxf_path: PathBuf,
    /// 可选的预览图路径，缩略图生成由上层负责
    pub image_path: Option<PathBuf>,
    /// 手动放置图纸时的原点（WGS84经度/纬度）
    pub origin: Option<Point<f64>>,
    /// 设计点偏移，图纸本地单位
    pub design_x: f64,
    pub design_y: f64,
    /// 本地北方向相对真北的角度（度）
    pub rotation: f64,
    /// 解析出的坐标系代码，空表示未参照
    pub epsg: Option<u32>,
    /// 装载时的字段快照，不持久化
    #[serde(skip)]
    pub baseline: GeoSnapshot,
}

impl Drawing {
    pub fn new(title: impl Into<String>, dxf_path: impl Into<PathBuf>) -> Self {
        let mut drawing = Self {
            id: 0,
            title: title.into(),
            dxf_path: dxf_path.into(),
            image_path: None,
            origin: None,
            design_x: 0.0,
            design_y: 0.0,
            rotation: 0.0,
            epsg: None,
            baseline: GeoSnapshot::default(),
        };
        drawing.refresh_baseline();
        drawing
    }

    /// 当前地理参照字段的快照
    pub fn geo_state(&self) -> GeoSnapshot {
        GeoSnapshot {
            dxf_path: self.dxf_path.clone(),
            origin: self.origin,
            design_x: self.design_x,
            design_y: self.design_y,
            rotation: self.rotation,
        }
    }

    /// 保存成功后重置快照基线
    pub fn refresh_baseline(&mut self) {
        self.baseline = self.geo_state();
    }

    pub fn origin_changed(&self) -> bool {
        self.baseline.origin != self.origin
    }

    pub fn dxf_changed(&self) -> bool {
        self.baseline.dxf_path != self.dxf_path
    }

    pub fn design_changed(&self) -> bool {
        self.baseline.design_x != self.design_x
            || self.baseline.design_y != self.design_y
            || self.baseline.rotation != self.rotation
    }
}

/// 图层：一张图纸内命名的几何分组，或复用为块模板
///
/// `(drawing, name, is_block)` 组合唯一。冲突不致命：
/// 仓库以随机后缀重命名并重试一次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub drawing: DrawingId,
    pub name: String,
    /// 显示颜色，`#RRGGBB`
    pub color: String,
    /// 连续线型标记
    pub linetype: bool,
    /// 复用为块模板
    pub is_block: bool,
    /// 非多边形几何的聚合集合
    pub geom: Option<GeometryCollection<f64>>,
}

impl Layer {
    pub fn new(drawing: DrawingId, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            drawing,
            name: name.into(),
            color: "#FFFFFF".to_string(),
            linetype: true,
            is_block: false,
            geom: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn as_block(mut self, geom: GeometryCollection<f64>) -> Self {
        self.is_block = true;
        self.geom = Some(geom);
        self
    }
}

/// 要素：一条提取结果
///
/// 三种形态共用一张表：图层聚合几何、带属性的分类多边形、
/// 块插入实例（`block` 与 `insertion` 同时设置）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub layer: LayerId,
    /// 仅插入要素设置，引用块模板图层（非独占）
    pub block: Option<LayerId>,
    /// 几何集合；纯插入可为空
    pub geom: Option<GeometryCollection<f64>>,
    /// 仅插入要素设置（WGS84经度/纬度）
    pub insertion: Option<Point<f64>>,
    pub rotation: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    /// 新放置的插入，保存时需重新生成覆盖几何
    pub pending_geometry: bool,
    /// 用户放置且尚未写回DXF文件
    pub added: bool,
}

impl Entity {
    pub fn aggregate(layer: LayerId, geom: GeometryCollection<f64>) -> Self {
        Self {
            id: 0,
            layer,
            block: None,
            geom: Some(geom),
            insertion: None,
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
            pending_geometry: false,
            added: false,
        }
    }

    /// 用户在地图上放置的新插入
    pub fn place_insertion(layer: LayerId, block: LayerId, insertion: Point<f64>) -> Self {
        Self {
            id: 0,
            layer,
            block: Some(block),
            geom: None,
            insertion: Some(insertion),
            rotation: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
            pending_geometry: true,
            added: true,
        }
    }
}

/// 要素上的一条键值属性
///
/// 块属性、计算指标（面积、周长）或任意标签。
/// 独立建模以便单独编辑。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityData {
    pub id: EntityDataId,
    pub entity: EntityId,
    pub key: String,
    pub value: String,
}

impl EntityData {
    pub fn new(entity: EntityId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: 0,
            entity,
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_tracks_changes() {
        let mut drawing = Drawing::new("plan", "/tmp/plan.dxf");
        assert!(!drawing.origin_changed());
        assert!(!drawing.dxf_changed());
        assert!(!drawing.design_changed());

        drawing.origin = Some(Point::new(12.0, 42.0));
        drawing.rotation = 30.0;
        assert!(drawing.origin_changed());
        assert!(drawing.design_changed());

        drawing.refresh_baseline();
        assert!(!drawing.origin_changed());
        assert!(!drawing.design_changed());
    }

    #[test]
    fn test_placed_insertion_markers() {
        let ent = Entity::place_insertion(1, 2, Point::new(12.0, 42.0));
        assert!(ent.pending_geometry);
        assert!(ent.added);
        assert_eq!(ent.x_scale, 1.0);
        assert_eq!(ent.y_scale, 1.0);
        assert_eq!(ent.rotation, 0.0);
    }
}
