//! CRS 解析
//!
//! 三个互斥分支，按固定优先级：
//! 1. 父图纸：逐字段复制，父引用是一次性命令，用完即弃
//! 2. 地图原点：以原点为退化包围盒查询UTM带，取第一个候选
//! 3. 内嵌地理数据：解析 GEODATA；缺失或无效都静默保持未参照
//!
//! 未参照是合法终态，不是错误。

use geo::Point;
use tracing::debug;

use geocad_core::crs::{resolve_utm_epsg, CrsCatalog};
use geocad_core::error::StoreError;
use geocad_core::model::{Drawing, DrawingId};
use geocad_core::store::MemoryStore;
use geocad_core::transform::Projection;
use geocad_file::CadDocument;

use crate::error::EngineError;

/// 内嵌地理数据分支的结果
pub enum ResolveOutcome {
    /// 解析成功，带回已打开的文档避免二次读取
    Resolved(CadDocument),
    /// 文件没有地理数据，需要用户输入
    NeedsManualInput,
    /// 地理数据存在但无效，保持未参照
    Unresolved,
}

/// 分支一：从父图纸复制地理参照
///
/// 父引用是瞬态命令而非持久字段，两张共享原点的图纸
/// 不会同时挂着活的父边，避免级联重解析。
pub fn from_parent(
    store: &mut MemoryStore,
    drawing: &mut Drawing,
    parent: DrawingId,
) -> Result<(), EngineError> {
    let parent = store
        .drawing(parent)
        .ok_or(StoreError::NotFound("drawing", parent))?;
    drawing.origin = parent.origin;
    drawing.epsg = parent.epsg;
    drawing.design_x = parent.design_x;
    drawing.design_y = parent.design_y;
    drawing.rotation = parent.rotation;
    store.upsert_drawing(drawing);
    Ok(())
}

/// 分支二：从地图原点查询UTM带
pub fn from_origin(
    catalog: &dyn CrsCatalog,
    store: &mut MemoryStore,
    drawing: &mut Drawing,
) -> Result<(), EngineError> {
    let origin = drawing.origin.ok_or(EngineError::NotGeoreferenced)?;
    let epsg = resolve_utm_epsg(catalog, origin.x(), origin.y())?;
    drawing.epsg = Some(epsg);
    store.upsert_drawing(drawing);
    Ok(())
}

/// 分支三：读内嵌 GEODATA
///
/// 文件打不开按致命错误传播；地理数据缺失或结构无效
/// 静默返回，不触发提取。
pub fn from_dxf(
    store: &mut MemoryStore,
    drawing: &mut Drawing,
) -> Result<ResolveOutcome, EngineError> {
    let document = CadDocument::load(&drawing.dxf_path)?;
    let Some(geodata) = document.geodata() else {
        return Ok(ResolveOutcome::NeedsManualInput);
    };
    let (epsg, xy_order) = match geodata.crs() {
        Ok(crs) => crs,
        Err(err) => {
            debug!(drawing = %drawing.title, %err, "invalid coordinate system definition");
            return Ok(ResolveOutcome::Unresolved);
        }
    };
    if !xy_order {
        debug!(drawing = %drawing.title, "geodata axis order is not xy");
        return Ok(ResolveOutcome::Unresolved);
    }
    let projection = match Projection::utm(epsg) {
        Ok(projection) => projection,
        Err(err) => {
            debug!(drawing = %drawing.title, %err, "geodata CRS is not a UTM zone");
            return Ok(ResolveOutcome::Unresolved);
        }
    };
    let (lon, lat) = match projection.to_wgs84(geodata.reference_point.0, geodata.reference_point.1)
    {
        Ok(point) => point,
        Err(err) => {
            debug!(drawing = %drawing.title, %err, "geodata reference point does not project");
            return Ok(ResolveOutcome::Unresolved);
        }
    };

    drawing.origin = Some(Point::new(lon, lat));
    drawing.design_x = geodata.design_point.0;
    drawing.design_y = geodata.design_point.1;
    drawing.rotation = geodata.rotation_degrees();
    drawing.epsg = Some(epsg);
    store.upsert_drawing(drawing);
    Ok(ResolveOutcome::Resolved(document))
}
