//! CAD 文档适配层
//!
//! 对 `dxf` crate 的薄封装：暴露图层、块定义、模型空间实体、
//! 块引用（插入），以及经原始组码层读写的地理数据记录。
//! 保存总是 ASCII DXF，并把 GEODATA 对象拼接回 OBJECTS 段。

use std::path::Path;

use dxf::entities::{Entity as DxfEntity, EntityType};
use tracing::info;

use crate::convert::{kind_of, EntityKind};
use crate::error::FileError;
use crate::geodata::{parse_geodata, splice_geodata, GeoData};
use crate::raw::RawDxf;

/// 图层表条目
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub name: String,
    /// ACI 颜色索引
    pub color_index: u8,
    /// 连续线型
    pub continuous: bool,
}

/// 模型空间中的文本，按文本关联的固定顺序收集
#[derive(Debug, Clone)]
pub struct TextItem {
    pub layer: String,
    pub position: (f64, f64),
    pub value: String,
    pub is_mtext: bool,
}

/// 块引用（插入），装载时立即物化为有限序列
#[derive(Debug, Clone)]
pub struct InsertRef {
    pub name: String,
    pub layer: String,
    pub location: (f64, f64),
    /// 度
    pub rotation: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    /// 挂在引用上的块属性 (tag → text)
    pub attributes: Vec<(String, String)>,
}

/// 已解析的 CAD 文档
pub struct CadDocument {
    drawing: dxf::Drawing,
    geodata: Option<GeoData>,
}

impl CadDocument {
    /// 从DXF文件装载
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let drawing =
            dxf::Drawing::load_file(path).map_err(|e| FileError::Dxf(e.to_string()))?;
        let raw = RawDxf::load(path)?;
        let geodata = parse_geodata(&raw);
        Ok(Self { drawing, geodata })
    }

    /// 从内存中的图形构造（测试与下载准备用）
    pub fn from_drawing(drawing: dxf::Drawing) -> Self {
        Self {
            drawing,
            geodata: None,
        }
    }

    pub fn geodata(&self) -> Option<&GeoData> {
        self.geodata.as_ref()
    }

    pub fn set_geodata(&mut self, geodata: GeoData) {
        self.geodata = Some(geodata);
    }

    /// 图层表（全部图层，过滤交给调用方）
    pub fn layers(&self) -> Vec<LayerInfo> {
        self.drawing
            .layers()
            .map(|layer| LayerInfo {
                name: layer.name.clone(),
                color_index: layer.color.index().unwrap_or(7) as u8,
                continuous: layer.line_type_name.eq_ignore_ascii_case("continuous")
                    || layer.line_type_name.is_empty(),
            })
            .collect()
    }

    /// 模型空间实体
    pub fn entities(&self) -> impl Iterator<Item = &DxfEntity> {
        self.drawing.entities()
    }

    /// 指定类型的模型空间实体，附所在图层名
    pub fn entities_of_kind(&self, kind: EntityKind) -> Vec<(&str, &DxfEntity)> {
        self.drawing
            .entities()
            .filter(move |e| kind_of(e) == Some(kind))
            .map(|e| (e.common.layer.as_str(), e))
            .collect()
    }

    /// 模型空间文本：MTEXT 在前、TEXT 在后（TEXT 覆盖 MTEXT）
    pub fn texts(&self) -> Vec<TextItem> {
        let mut items = Vec::new();
        for entity in self.drawing.entities() {
            if let EntityType::MText(mtext) = &entity.specific {
                items.push(TextItem {
                    layer: entity.common.layer.clone(),
                    position: (mtext.insertion_point.x, mtext.insertion_point.y),
                    value: mtext.text.clone(),
                    is_mtext: true,
                });
            }
        }
        for entity in self.drawing.entities() {
            if let EntityType::Text(text) = &entity.specific {
                items.push(TextItem {
                    layer: entity.common.layer.clone(),
                    position: (text.location.x, text.location.y),
                    value: text.value.clone(),
                    is_mtext: false,
                });
            }
        }
        items
    }

    /// 块定义
    pub fn blocks(&self) -> impl Iterator<Item = &dxf::Block> {
        self.drawing.blocks()
    }

    pub fn block(&self, name: &str) -> Option<&dxf::Block> {
        self.drawing.blocks().find(|b| b.name == name)
    }

    /// 模型空间的全部块引用，物化为有限序列
    pub fn inserts(&self) -> Vec<InsertRef> {
        self.drawing
            .entities()
            .filter_map(|entity| match &entity.specific {
                EntityType::Insert(insert) => Some(InsertRef {
                    name: insert.name.clone(),
                    layer: entity.common.layer.clone(),
                    location: (insert.location.x, insert.location.y),
                    rotation: insert.rotation,
                    x_scale: insert.x_scale_factor,
                    y_scale: insert.y_scale_factor,
                    attributes: insert
                        .attributes()
                        .map(|a| (a.attribute_tag.clone(), a.value.clone()))
                        .collect(),
                }),
                _ => None,
            })
            .collect()
    }

    /// 确保图层存在（下载准备时新图层可能来自用户放置）
    pub fn ensure_layer(&mut self, name: &str) {
        let exists = self.drawing.layers().any(|l| l.name == name);
        if !exists {
            let mut layer = dxf::tables::Layer::default();
            layer.name = name.to_string();
            self.drawing.add_layer(layer);
        }
    }

    /// 追加一个块引用到模型空间
    pub fn add_insert(
        &mut self,
        name: &str,
        layer: &str,
        location: (f64, f64),
        rotation: f64,
        x_scale: f64,
        y_scale: f64,
    ) {
        let mut insert = dxf::entities::Insert::default();
        insert.name = name.to_string();
        insert.location = dxf::Point::new(location.0, location.1, 0.0);
        insert.rotation = rotation;
        insert.x_scale_factor = x_scale;
        insert.y_scale_factor = y_scale;
        let mut entity = DxfEntity::new(EntityType::Insert(insert));
        entity.common.layer = layer.to_string();
        self.drawing.add_entity(entity);
    }

    /// 保存为 ASCII DXF，并把 GEODATA 对象拼接回文件
    pub fn save(&mut self, path: &Path) -> Result<(), FileError> {
        self.drawing
            .save_file(path)
            .map_err(|e| FileError::Dxf(e.to_string()))?;
        if let Some(geodata) = &self.geodata {
            let mut raw = RawDxf::load(path)?;
            splice_geodata(&mut raw, geodata);
            raw.save(path)?;
        }
        info!("Saved DXF to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodata::epsg_xml;
    use dxf::entities::{Line, Text};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("geocad_doc_{}_{}.dxf", std::process::id(), name))
    }

    fn build_drawing() -> dxf::Drawing {
        let mut drawing = dxf::Drawing::new();
        // 新实体类型要求 R13+ 的文件版本
        drawing.header.version = dxf::enums::AcadVersion::R2010;
        let mut layer = dxf::tables::Layer::default();
        layer.name = "one".to_string();
        drawing.add_layer(layer);

        let mut line = Line::default();
        line.p1 = dxf::Point::new(0.0, 0.0, 0.0);
        line.p2 = dxf::Point::new(10.0, 0.0, 0.0);
        let mut entity = DxfEntity::new(EntityType::Line(line));
        entity.common.layer = "one".to_string();
        drawing.add_entity(entity);

        let mut text = Text::default();
        text.value = "Room".to_string();
        text.location = dxf::Point::new(5.0, 5.0, 0.0);
        let mut entity = DxfEntity::new(EntityType::Text(text));
        entity.common.layer = "one".to_string();
        drawing.add_entity(entity);

        drawing
    }

    #[test]
    fn test_save_load_round_trip() {
        let path = temp_path("roundtrip");
        let mut document = CadDocument::from_drawing(build_drawing());
        document.save(&path).expect("save");

        let loaded = CadDocument::load(&path).expect("load");
        assert!(loaded.layers().iter().any(|l| l.name == "one"));
        assert_eq!(loaded.entities_of_kind(EntityKind::Line).len(), 1);
        let texts = loaded.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].value, "Room");
        assert!(loaded.geodata().is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_geodata_survives_save() {
        let path = temp_path("geodata");
        let mut document = CadDocument::from_drawing(build_drawing());
        document.set_geodata(GeoData {
            design_point: (0.0, 0.0, 0.0),
            reference_point: (251535.08, 4654130.89, 0.0),
            north_direction: (0.0, 1.0),
            coordinate_system_definition: epsg_xml(32633),
        });
        document.save(&path).expect("save");

        let loaded = CadDocument::load(&path).expect("load");
        let geodata = loaded.geodata().expect("geodata");
        assert_eq!(geodata.reference_point.0, 251535.08);
        let (epsg, xy) = geodata.crs().expect("crs");
        assert_eq!(epsg, 32633);
        assert!(xy);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_added_insert_round_trip() {
        let path = temp_path("insert");
        let mut document = CadDocument::from_drawing(build_drawing());
        document.ensure_layer("furniture");
        document.add_insert("chair", "furniture", (3.0, 4.0), 45.0, 1.0, 1.0);
        document.save(&path).expect("save");

        let loaded = CadDocument::load(&path).expect("load");
        let inserts = loaded.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].name, "chair");
        assert_eq!(inserts[0].layer, "furniture");
        assert!((inserts[0].rotation - 45.0).abs() < 1e-9);

        std::fs::remove_file(&path).ok();
    }
}
