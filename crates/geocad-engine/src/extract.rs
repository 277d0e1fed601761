//! 几何提取
//!
//! 按固定类型顺序遍历模型空间实体、块定义与块引用，
//! 在本地坐标完成有效性与分类判定，再整体变换到WGS84落库：
//!
//! 1. 图层表构建（黑名单过滤、颜色表查询）
//! 2. 逐类型实体提取，多段线做多边形分类与文本关联
//! 3. 图层聚合要素落库
//! 4. 块定义转为模板图层
//! 5. 块引用物化爆炸后落库
//!
//! 单个实体转换失败只丢弃该实体，图纸整体照常成功。

use std::collections::{BTreeMap, HashMap};
use std::mem;

use geo::{Area, Contains, Geometry, GeometryCollection, LineString, Point, Polygon, Validation};
use tracing::debug;

use geocad_core::color::aci_to_hex;
use geocad_core::model::{Drawing, Entity, EntityData, Layer, LayerId};
use geocad_core::store::MemoryStore;
use geocad_core::transform::{DrawingTransforms, WcsTransform};
use geocad_file::convert::{
    entity_geometry, insert_transform, kind_of, polyline_points, polyline_profile, ring_to_line,
    try_map_geometry, EntityKind, CONVERTIBLE_KINDS,
};
use geocad_file::{CadDocument, InsertRef, TextItem};

use crate::error::EngineError;

/// 分类多边形产出的属性键，插入顺序即落库顺序
const NAME_KEY: &str = "Name";
const SURFACE_KEY: &str = "Surface";
const HEIGHT_KEY: &str = "Height";
const PERIMETER_KEY: &str = "Perimeter";
const WIDTH_KEY: &str = "Width";

struct LayerSlot {
    layer: LayerId,
    geometries: Vec<Geometry<f64>>,
}

pub struct Extractor<'a> {
    drawing: &'a Drawing,
    transforms: &'a DrawingTransforms,
    wcs: WcsTransform,
    layer_blacklist: &'a [String],
    block_blacklist: &'a [String],
}

impl<'a> Extractor<'a> {
    pub fn new(
        drawing: &'a Drawing,
        transforms: &'a DrawingTransforms,
        wcs: WcsTransform,
        layer_blacklist: &'a [String],
        block_blacklist: &'a [String],
    ) -> Self {
        Self {
            drawing,
            transforms,
            wcs,
            layer_blacklist,
            block_blacklist,
        }
    }

    pub fn run(
        &self,
        store: &mut MemoryStore,
        document: &CadDocument,
    ) -> Result<(), EngineError> {
        let mut layer_table = self.prepare_layer_table(store, document);
        let texts = document.texts();
        for kind in CONVERTIBLE_KINDS {
            self.extract_entities(store, document, kind, &texts, &mut layer_table);
        }
        self.create_layer_entities(store, &mut layer_table);
        let block_table = self.save_blocks(store, document);
        for insert in document.inserts() {
            self.extract_insertion(store, document, &insert, &layer_table, &block_table);
        }
        Ok(())
    }

    /// 本地几何 → WGS84；无效多边形与投影失败都按不可转换丢弃
    fn georeference(&self, local: &Geometry<f64>) -> Option<Geometry<f64>> {
        if let Geometry::Polygon(polygon) = local {
            if !polygon.is_valid() {
                return None;
            }
        }
        let wcs = self.wcs;
        let projection = self.transforms.projection;
        try_map_geometry(local, &mut |x, y| {
            let (easting, northing) = wcs.wcs_to_crs(x, y);
            projection.to_wgs84(easting, northing)
        })
        .ok()
    }

    fn prepare_layer_table(
        &self,
        store: &mut MemoryStore,
        document: &CadDocument,
    ) -> BTreeMap<String, LayerSlot> {
        let mut table = BTreeMap::new();
        for info in document.layers() {
            if self.layer_blacklist.contains(&info.name) {
                continue;
            }
            let mut template = Layer::new(self.drawing.id, info.name.as_str())
                .with_color(aci_to_hex(info.color_index));
            template.linetype = info.continuous;
            let (layer, _created) = store.get_or_create_layer(template);
            table.insert(
                info.name,
                LayerSlot {
                    layer,
                    geometries: Vec::new(),
                },
            );
        }
        table
    }

    fn extract_entities(
        &self,
        store: &mut MemoryStore,
        document: &CadDocument,
        kind: EntityKind,
        texts: &[TextItem],
        layer_table: &mut BTreeMap<String, LayerSlot>,
    ) {
        for (layer_name, entity) in document.entities_of_kind(kind) {
            let Some(local) = entity_geometry(entity) else {
                continue;
            };
            let layer_name = layer_name.to_string();
            let Some(slot) = layer_table.get_mut(&layer_name) else {
                // 黑名单图层
                continue;
            };
            if matches!(kind, EntityKind::LwPolyline | EntityKind::Polyline) {
                let profile = polyline_profile(entity).unwrap_or((0.0, 0.0, 0.0));
                let closed = polyline_points(entity).map(|(_, c)| c).unwrap_or(false);
                self.extract_polyline(store, local, &layer_name, closed, profile, texts, slot);
            } else if let Some(world) = self.georeference(&local) {
                slot.geometries.push(world);
            }
        }
    }

    /// 多段线特判：闭合有效环成为独立的分类要素，
    /// 其余（开放、自相交、退化）并入图层聚合
    fn extract_polyline(
        &self,
        store: &mut MemoryStore,
        local: Geometry<f64>,
        layer_name: &str,
        closed: bool,
        profile: (f64, f64, f64),
        texts: &[TextItem],
        slot: &mut LayerSlot,
    ) {
        let (thickness, width, _elevation) = profile;
        match local {
            Geometry::Polygon(polygon) if polygon.is_valid() => {
                let mut data: Vec<(String, String)> = Vec::new();
                if let Some(name) = contained_text(&polygon, layer_name, texts) {
                    data.push((NAME_KEY.to_string(), name));
                }
                if closed {
                    data.push((
                        SURFACE_KEY.to_string(),
                        format_number(round2(polygon.unsigned_area())),
                    ));
                }
                if thickness != 0.0 {
                    data.push((HEIGHT_KEY.to_string(), format_number(round2(thickness))));
                }
                data.push((
                    PERIMETER_KEY.to_string(),
                    format_number(round2(ring_length(polygon.exterior()))),
                ));
                if width != 0.0 {
                    data.push((WIDTH_KEY.to_string(), format_number(round2(width))));
                }
                let Some(world) = self.georeference(&Geometry::Polygon(polygon)) else {
                    return;
                };
                let entity = store.create_entity(Entity::aggregate(
                    slot.layer,
                    GeometryCollection::from(vec![world]),
                ));
                for (key, value) in data {
                    store.create_entity_data(EntityData::new(entity, key, value));
                }
            }
            Geometry::Polygon(polygon) => {
                // 自相交环降级为折线
                if let Some(world) = self.georeference(&ring_to_line(&polygon)) {
                    slot.geometries.push(world);
                }
            }
            other => {
                if let Some(world) = self.georeference(&other) {
                    slot.geometries.push(world);
                }
            }
        }
    }

    fn create_layer_entities(
        &self,
        store: &mut MemoryStore,
        layer_table: &mut BTreeMap<String, LayerSlot>,
    ) {
        for slot in layer_table.values_mut() {
            if slot.geometries.is_empty() {
                continue;
            }
            let collection = GeometryCollection::from(mem::take(&mut slot.geometries));
            store.create_entity(Entity::aggregate(slot.layer, collection));
        }
    }

    /// 块定义转模板图层；没有可转换几何的块不留占位
    fn save_blocks(
        &self,
        store: &mut MemoryStore,
        document: &CadDocument,
    ) -> HashMap<String, LayerId> {
        let mut table = HashMap::new();
        for block in document.blocks() {
            if self.block_blacklist.contains(&block.name) {
                continue;
            }
            let mut geometries = Vec::new();
            for kind in CONVERTIBLE_KINDS {
                for entity in block.entities.iter().filter(|e| kind_of(e) == Some(kind)) {
                    let Some(local) = entity_geometry(entity) else {
                        continue;
                    };
                    if let Some(world) = self.georeference(&local) {
                        geometries.push(world);
                    }
                }
            }
            if geometries.is_empty() {
                continue;
            }
            let template = Layer::new(self.drawing.id, block.name.as_str())
                .as_block(GeometryCollection::from(geometries));
            let (layer, _created) = store.get_or_create_layer(template);
            table.insert(block.name.clone(), layer);
        }
        table
    }

    fn extract_insertion(
        &self,
        store: &mut MemoryStore,
        document: &CadDocument,
        insert: &InsertRef,
        layer_table: &BTreeMap<String, LayerSlot>,
        block_table: &HashMap<String, LayerId>,
    ) {
        if self.block_blacklist.contains(&insert.name) {
            return;
        }
        let Some(slot) = layer_table.get(&insert.layer) else {
            return;
        };
        let Some(&block_layer) = block_table.get(&insert.name) else {
            // 块没有产出模板图层（无几何或黑名单）
            return;
        };
        let point = Geometry::Point(Point::new(insert.location.0, insert.location.1));
        let Some(Geometry::Point(insertion_point)) = self.georeference(&point) else {
            debug!(block = %insert.name, "insertion point failed to georeference");
            return;
        };

        // 虚拟爆炸：先物化成有限序列，再逐个转换
        let mut geometries = Vec::new();
        if let Some(block) = document.block(&insert.name) {
            let exploded: Vec<Geometry<f64>> = block
                .entities
                .iter()
                .filter(|e| kind_of(e).is_some())
                .filter_map(entity_geometry)
                .map(|g| {
                    insert_transform(
                        &g,
                        insert.x_scale,
                        insert.y_scale,
                        insert.rotation,
                        insert.location,
                    )
                })
                .collect();
            for local in exploded {
                if let Some(world) = self.georeference(&local) {
                    geometries.push(world);
                }
            }
        }

        let rotation = if insert.rotation != 0.0 {
            round2(insert.rotation)
        } else {
            0.0
        };
        let x_scale = if insert.x_scale != 0.0 {
            round2(insert.x_scale)
        } else {
            1.0
        };
        let y_scale = if insert.y_scale != 0.0 {
            round2(insert.y_scale)
        } else {
            1.0
        };

        let entity = Entity {
            id: 0,
            layer: slot.layer,
            block: Some(block_layer),
            geom: if geometries.is_empty() {
                None
            } else {
                Some(GeometryCollection::from(geometries))
            },
            insertion: Some(insertion_point),
            rotation,
            x_scale,
            y_scale,
            pending_geometry: false,
            added: false,
        };
        let entity = store.create_entity(entity);
        for (tag, text) in &insert.attributes {
            store.create_entity_data(EntityData::new(entity, tag.clone(), text.clone()));
        }
    }
}

/// 找被多边形包含的文本：同图层，MTEXT 先匹配，TEXT 覆盖
fn contained_text(polygon: &Polygon<f64>, layer: &str, texts: &[TextItem]) -> Option<String> {
    let mut name = None;
    for item in texts.iter().filter(|t| t.is_mtext && t.layer == layer) {
        if polygon.contains(&Point::new(item.position.0, item.position.1)) {
            name = Some(item.value.clone());
            break;
        }
    }
    for item in texts.iter().filter(|t| !t.is_mtext && t.layer == layer) {
        if polygon.contains(&Point::new(item.position.0, item.position.1)) {
            name = Some(item.value.clone());
            break;
        }
    }
    name
}

/// 闭合环周长，本地单位
pub(crate) fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.lines()
        .map(|segment| {
            let dx = segment.end.x - segment.start.x;
            let dy = segment.end.y - segment.start.y;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn format_number(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(40.0), 40.0);
        assert_eq!(format_number(round2(100.0)), "100");
        assert_eq!(format_number(round2(2.5)), "2.5");
    }

    #[test]
    fn test_ring_length_square() {
        let ring = LineString::new(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ]);
        assert!((ring_length(&ring) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_contained_text_prefers_plain_text() {
        let polygon = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 10.0, y: 10.0 },
                Coord { x: 0.0, y: 10.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        let texts = vec![
            TextItem {
                layer: "one".to_string(),
                position: (5.0, 5.0),
                value: "FromMtext".to_string(),
                is_mtext: true,
            },
            TextItem {
                layer: "one".to_string(),
                position: (2.0, 2.0),
                value: "Room".to_string(),
                is_mtext: false,
            },
        ];
        assert_eq!(
            contained_text(&polygon, "one", &texts),
            Some("Room".to_string())
        );
        // 别的图层的文本不参与
        assert_eq!(contained_text(&polygon, "two", &texts), None);
    }

    #[test]
    fn test_contained_text_outside_polygon() {
        let polygon = Polygon::new(
            LineString::new(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 0.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        );
        let texts = vec![TextItem {
            layer: "one".to_string(),
            position: (5.0, 5.0),
            value: "Far".to_string(),
            is_mtext: false,
        }];
        assert_eq!(contained_text(&polygon, "one", &texts), None);
    }
}
