//! 表格与地图输出
//!
//! - 要素CSV：固定列序，缺失字段留空串
//! - 多段线轮廓CSV：开放、带全局宽度的多段线报表
//! - GeoJSON FeatureCollection：地图显示用

use std::io::Write;

use geo::Geometry;
use tracing::debug;

use geocad_core::model::Drawing;
use geocad_core::store::MemoryStore;
use geocad_file::convert::{polyline_points, polyline_profile, EntityKind};
use geocad_file::CadDocument;

use crate::error::EngineError;

/// 要素CSV的固定列序
pub const CSV_HEADERS: [&str; 14] = [
    "ID",
    "Layer",
    "Block",
    "Name",
    "Surface",
    "Perimeter",
    "Height",
    "Width",
    "Rotation",
    "X scale",
    "Y scale",
    "Latitude",
    "Longitude",
    "Attributes",
];

const CLASSIFIED_KEYS: [&str; 5] = ["Name", "Surface", "Perimeter", "Height", "Width"];

/// 导出图纸的要素表
pub fn write_csv<W: Write>(
    store: &MemoryStore,
    drawing: &Drawing,
    writer: W,
) -> Result<(), EngineError> {
    // 属性键值对平铺在固定列之后，行长不等
    let mut csv = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    csv.write_record(CSV_HEADERS)?;
    for layer in store.layers_of(drawing.id) {
        for entity in store.entities_of(layer.id) {
            let data = store.data_of(entity.id);
            let mut row: Vec<String> = Vec::with_capacity(CSV_HEADERS.len());
            row.push(entity.id.to_string());
            row.push(layer.name.clone());

            if let Some(insertion) = entity.insertion {
                let block_name = entity
                    .block
                    .and_then(|b| store.layer(b))
                    .map(|l| l.name.clone())
                    .unwrap_or_default();
                row.push(block_name);
                for _ in CLASSIFIED_KEYS {
                    row.push(String::new());
                }
                row.push(entity.rotation.to_string());
                row.push(entity.x_scale.to_string());
                row.push(entity.y_scale.to_string());
                row.push(insertion.x().to_string());
                row.push(insertion.y().to_string());
                for item in &data {
                    row.push(item.key.clone());
                    row.push(item.value.clone());
                }
            } else {
                row.push(String::new());
                for key in CLASSIFIED_KEYS {
                    let value = data
                        .iter()
                        .find(|d| d.key == key)
                        .map(|d| d.value.clone())
                        .unwrap_or_default();
                    row.push(value);
                }
                for _ in 0..5 {
                    row.push(String::new());
                }
            }
            csv.write_record(&row)?;
        }
    }
    csv.flush()?;
    Ok(())
}

/// 开放多段线的轮廓报表（图层、标高、长度、宽、高、直径）
///
/// 只统计带全局宽度的开放多段线：无挤出厚度的按圆管（直径），
/// 有厚度的按矩形截面（宽×高）。
pub fn write_polyline_profile_csv<W: Write>(
    document: &CadDocument,
    writer: W,
) -> Result<(), EngineError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Layer", "Elevation", "Length", "Width", "Height", "Diameter"])?;
    for kind in [EntityKind::LwPolyline, EntityKind::Polyline] {
        for (layer, entity) in document.entities_of_kind(kind) {
            let Some((points, closed)) = polyline_points(entity) else {
                continue;
            };
            if closed {
                continue;
            }
            let Some((thickness, width, elevation)) = polyline_profile(entity) else {
                continue;
            };
            if width == 0.0 {
                continue;
            }
            let length: f64 = points
                .windows(2)
                .map(|pair| {
                    let dx = pair[1].x - pair[0].x;
                    let dy = pair[1].y - pair[0].y;
                    (dx * dx + dy * dy).sqrt()
                })
                .sum();
            let (width, height, diameter) = if thickness == 0.0 {
                (0.0, 0.0, width)
            } else {
                (width, thickness, 0.0)
            };
            csv.write_record(&[
                layer.to_string(),
                elevation.to_string(),
                length.to_string(),
                width.to_string(),
                height.to_string(),
                diameter.to_string(),
            ])?;
        }
    }
    csv.flush()?;
    Ok(())
}

/// 图纸要素转 GeoJSON FeatureCollection
pub fn feature_collection(store: &MemoryStore, drawing: &Drawing) -> geojson::FeatureCollection {
    let mut features = Vec::new();
    for layer in store.layers_of(drawing.id) {
        for entity in store.entities_of(layer.id) {
            let Some(collection) = &entity.geom else {
                debug!(entity = entity.id, "entity without geometry skipped");
                continue;
            };
            let geometry = Geometry::GeometryCollection(collection.clone());
            let mut properties = geojson::JsonObject::new();
            properties.insert("id".to_string(), entity.id.into());
            properties.insert("layer".to_string(), layer.name.clone().into());
            properties.insert("color".to_string(), layer.color.clone().into());
            properties.insert("linetype".to_string(), layer.linetype.into());
            if let Some(block) = entity.block.and_then(|b| store.layer(b)) {
                properties.insert("block".to_string(), block.name.clone().into());
            }
            for item in store.data_of(entity.id) {
                properties.insert(item.key.clone(), item.value.clone().into());
            }
            features.push(geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            });
        }
    }
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
