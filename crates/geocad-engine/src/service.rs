//! 图纸生命周期编排
//!
//! 图纸保存的状态机：
//! - 未参照（`epsg` 空）：按固定分支顺序尝试解析，成功即提取；
//!   无地理数据且无人工输入则保持未参照并告警
//! - 已参照：恰好四个独立触发器（新父图纸、原点变更、DXF替换、
//!   设计点/旋转变更），每个都先删除全部派生图层再重新解析提取；
//!   无触发器的保存对派生数据是空操作
//!
//! 一次解析-提取周期跑在仓库事务里：部分提取不可见。
//! 重新提取会连带删除用户手工放置的插入，这是有意的既定行为。

use tracing::{info, warn};

use geo::GeometryCollection;
use geocad_core::crs::{CrsCatalog, Wgs84UtmCatalog};
use geocad_core::error::StoreError;
use geocad_core::model::{Drawing, DrawingId, Entity, EntityData};
use geocad_core::store::MemoryStore;
use geocad_core::transform::{DrawingTransforms, WcsTransform};
use geocad_file::convert::{insert_transform, try_map_geometry};
use geocad_file::geodata::{epsg_xml, GeoData};
use geocad_file::{CadDocument, FileError};

use crate::error::EngineError;
use crate::extract::Extractor;
use crate::resolve::{self, ResolveOutcome};

/// 默认跳过的图层名
pub const DEFAULT_LAYER_BLACKLIST: [&str; 1] = ["Defpoints"];

/// 默认跳过的块名
pub const DEFAULT_BLOCK_BLACKLIST: [&str; 2] = ["*Model_Space", "DynamicInputDot"];

pub struct GeoreferenceService {
    catalog: Box<dyn CrsCatalog>,
    layer_blacklist: Vec<String>,
    block_blacklist: Vec<String>,
}

impl Default for GeoreferenceService {
    fn default() -> Self {
        Self::new(
            Box::new(Wgs84UtmCatalog),
            DEFAULT_LAYER_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            DEFAULT_BLOCK_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl GeoreferenceService {
    /// 黑名单是显式参数，不读环境配置
    pub fn new(
        catalog: Box<dyn CrsCatalog>,
        layer_blacklist: Vec<String>,
        block_blacklist: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            layer_blacklist,
            block_blacklist,
        }
    }

    /// 保存图纸并按需解析、提取
    ///
    /// `resolve_from` 是一次性的"从父图纸解析"命令。
    /// 解析-提取失败时仓库回滚，传入的图纸保持原状。
    pub fn save_drawing(
        &self,
        store: &mut MemoryStore,
        drawing: &mut Drawing,
        resolve_from: Option<DrawingId>,
    ) -> Result<(), EngineError> {
        // 基本字段先落库，相当于普通保存
        if drawing.id == 0 {
            drawing.id = store.insert_drawing(drawing.clone());
        } else {
            store.upsert_drawing(drawing);
        }

        let mut work = drawing.clone();
        store.transaction(|st| self.run_georeference(st, &mut work, resolve_from))?;
        work.refresh_baseline();
        store.upsert_drawing(&work);
        *drawing = work;
        Ok(())
    }

    fn run_georeference(
        &self,
        store: &mut MemoryStore,
        work: &mut Drawing,
        resolve_from: Option<DrawingId>,
    ) -> Result<(), EngineError> {
        if work.epsg.is_none() {
            if let Some(parent) = resolve_from {
                resolve::from_parent(store, work, parent)?;
                self.extract(store, work, None, true)?;
            } else if work.origin.is_some() {
                resolve::from_origin(self.catalog.as_ref(), store, work)?;
                self.extract(store, work, None, true)?;
            } else {
                match resolve::from_dxf(store, work)? {
                    ResolveOutcome::Resolved(document) => {
                        self.extract(store, work, Some(document), false)?;
                    }
                    ResolveOutcome::NeedsManualInput => {
                        warn!(
                            drawing = %work.title,
                            "DXF has no geodata, drawing saved without georeferencing"
                        );
                    }
                    ResolveOutcome::Unresolved => {
                        warn!(
                            drawing = %work.title,
                            "embedded geodata is invalid, drawing saved without georeferencing"
                        );
                    }
                }
            }
            return Ok(());
        }

        // 已有坐标系：检查四个独立触发器
        if let Some(parent) = resolve_from {
            store.delete_layers_of(work.id);
            resolve::from_parent(store, work, parent)?;
            self.extract(store, work, None, true)?;
            return Ok(());
        }
        if work.origin.is_some() && work.origin_changed() {
            store.delete_layers_of(work.id);
            resolve::from_origin(self.catalog.as_ref(), store, work)?;
            self.extract(store, work, None, true)?;
            return Ok(());
        }
        if work.dxf_changed() {
            store.delete_layers_of(work.id);
            match resolve::from_dxf(store, work)? {
                ResolveOutcome::Resolved(document) => {
                    self.extract(store, work, Some(document), false)?;
                }
                _ => {
                    // 新文件没有（有效）地理数据：退回此前的锚定继续提取
                    if work.origin.is_some() {
                        self.extract(store, work, None, true)?;
                    }
                }
            }
            return Ok(());
        }
        if work.design_changed() {
            store.delete_layers_of(work.id);
            self.extract(store, work, None, true)?;
        }
        Ok(())
    }

    /// 提取：准备变换 → 按需合成地理数据并重写文件 → 走提取流水线
    fn extract(
        &self,
        store: &mut MemoryStore,
        work: &mut Drawing,
        document: Option<CadDocument>,
        refresh: bool,
    ) -> Result<(), EngineError> {
        let transforms = drawing_transforms(work)?;
        let mut document = match document {
            Some(document) => document,
            None => CadDocument::load(&work.dxf_path)?,
        };
        if document.geodata().is_none() || refresh {
            let geodata = GeoData {
                design_point: (work.design_x, work.design_y, 0.0),
                reference_point: (transforms.anchor.0, transforms.anchor.1, 0.0),
                north_direction: transforms.north_direction(),
                coordinate_system_definition: epsg_xml(transforms.projection.epsg()),
            };
            document.set_geodata(geodata);
            // 文件重写先于提取读取
            document.save(&work.dxf_path)?;
        }

        // 仿射取自文档内的地理数据（真实或合成）
        let wcs = match document.geodata() {
            Some(geodata) => WcsTransform::new(
                (geodata.reference_point.0, geodata.reference_point.1),
                (geodata.design_point.0, geodata.design_point.1),
                WcsTransform::rotation_from_north(geodata.north_direction),
            ),
            None => {
                return Err(
                    FileError::InvalidGeodata("geodata missing after refresh".to_string()).into(),
                )
            }
        };

        let extractor = Extractor::new(
            work,
            &transforms,
            wcs,
            &self.layer_blacklist,
            &self.block_blacklist,
        );
        extractor.run(store, &document)?;
        info!(drawing = %work.title, epsg = transforms.projection.epsg(), "extraction complete");
        Ok(())
    }

    /// 插入要素的保存子状态机
    ///
    /// 带块模板且标记待生成的要素，把模板几何经图纸当前锚定
    /// 重放成覆盖几何，然后清除标记。没有属性的新插入
    /// 继承第一条同块插入的属性，这是易用性默认而非正确性要求。
    pub fn save_entity(
        &self,
        store: &mut MemoryStore,
        drawing: &Drawing,
        entity: &mut Entity,
    ) -> Result<(), EngineError> {
        if entity.pending_geometry {
            if let Some(block_id) = entity.block {
                let block_layer = store
                    .layer(block_id)
                    .ok_or(StoreError::NotFound("layer", block_id))?
                    .clone();
                let insertion = entity.insertion.ok_or(EngineError::MissingInsertionPoint)?;
                let transforms = drawing_transforms(drawing)?;
                let wcs = transforms.wcs_transform();
                let projection = transforms.projection;

                let mut to_local =
                    |x: f64, y: f64| -> Result<(f64, f64), geocad_core::error::CrsError> {
                        let (easting, northing) = projection.from_wgs84(x, y)?;
                        Ok(wcs.crs_to_wcs(easting, northing))
                    };
                let insertion_local = to_local(insertion.x(), insertion.y())?;

                let mut overlay = Vec::new();
                if let Some(template) = &block_layer.geom {
                    for geometry in &template.0 {
                        let local = try_map_geometry(geometry, &mut to_local)?;
                        let placed = insert_transform(
                            &local,
                            entity.x_scale,
                            entity.y_scale,
                            entity.rotation,
                            insertion_local,
                        );
                        let world = try_map_geometry(&placed, &mut |x, y| {
                            let (easting, northing) = wcs.wcs_to_crs(x, y);
                            projection.to_wgs84(easting, northing)
                        })?;
                        overlay.push(world);
                    }
                }
                entity.geom = if overlay.is_empty() {
                    None
                } else {
                    Some(GeometryCollection::from(overlay))
                };
                entity.pending_geometry = false;
            }
        }

        if entity.id == 0 {
            entity.id = store.create_entity(entity.clone());
        } else {
            store.update_entity(entity)?;
        }

        // 属性继承
        if let Some(block_id) = entity.block {
            if store.data_of(entity.id).is_empty() {
                let sibling = store
                    .block_insertions(block_id)
                    .into_iter()
                    .find(|e| e.id != entity.id)
                    .map(|e| e.id);
                if let Some(sibling) = sibling {
                    let rows: Vec<(String, String)> = store
                        .data_of(sibling)
                        .iter()
                        .map(|d| (d.key.clone(), d.value.clone()))
                        .collect();
                    for (key, value) in rows {
                        store.create_entity_data(EntityData::new(entity.id, key, value));
                    }
                }
            }
        }
        Ok(())
    }

    /// 下载准备：把用户放置、尚未写回的插入追加进存储的DXF文件
    ///
    /// 写回后清除 `added` 标记并刷新地理数据，文件对外部CAD工具
    /// 保持可移植。返回是否有写回发生。
    pub fn prepare_download(
        &self,
        store: &mut MemoryStore,
        drawing: &Drawing,
    ) -> Result<bool, EngineError> {
        let block_ids: Vec<_> = store
            .layers_of(drawing.id)
            .into_iter()
            .filter(|l| l.is_block)
            .map(|l| l.id)
            .collect();
        if block_ids.is_empty() {
            return Ok(false);
        }
        let mut pending: Vec<Entity> = Vec::new();
        for block in &block_ids {
            pending.extend(
                store
                    .block_insertions(*block)
                    .into_iter()
                    .filter(|e| e.added)
                    .cloned(),
            );
        }
        if pending.is_empty() {
            return Ok(false);
        }

        let transforms = drawing_transforms(drawing)?;
        let wcs = transforms.wcs_transform();
        let mut document = CadDocument::load(&drawing.dxf_path)?;
        if document.geodata().is_none() {
            document.set_geodata(GeoData {
                design_point: (drawing.design_x, drawing.design_y, 0.0),
                reference_point: (transforms.anchor.0, transforms.anchor.1, 0.0),
                north_direction: transforms.north_direction(),
                coordinate_system_definition: epsg_xml(transforms.projection.epsg()),
            });
        }

        let mut written = Vec::new();
        for entity in &pending {
            let Some(block_id) = entity.block else {
                continue;
            };
            let Some(insertion) = entity.insertion else {
                continue;
            };
            let block_name = match store.layer(block_id) {
                Some(layer) => layer.name.clone(),
                None => continue,
            };
            let layer_name = match store.layer(entity.layer) {
                Some(layer) => layer.name.clone(),
                None => continue,
            };
            let (easting, northing) = transforms
                .projection
                .from_wgs84(insertion.x(), insertion.y())?;
            let location = wcs.crs_to_wcs(easting, northing);
            document.ensure_layer(&layer_name);
            document.add_insert(
                &block_name,
                &layer_name,
                location,
                entity.rotation,
                entity.x_scale,
                entity.y_scale,
            );
            written.push(entity.id);
        }
        document.save(&drawing.dxf_path)?;

        for id in written {
            if let Some(entity) = store.entity(id) {
                let mut updated = entity.clone();
                updated.added = false;
                store.update_entity(&updated)?;
            }
        }
        info!(drawing = %drawing.title, count = pending.len(), "insertions written to DXF");
        Ok(true)
    }
}

fn drawing_transforms(drawing: &Drawing) -> Result<DrawingTransforms, EngineError> {
    let origin = drawing.origin.ok_or(EngineError::NotGeoreferenced)?;
    let epsg = drawing.epsg.ok_or(EngineError::NotGeoreferenced)?;
    Ok(DrawingTransforms::build(
        epsg,
        (origin.x(), origin.y()),
        (drawing.design_x, drawing.design_y),
        drawing.rotation,
    )?)
}
