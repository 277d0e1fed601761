//! 投影坐标系查询
//!
//! 给定WGS84坐标点，返回适用的UTM带EPSG候选码。
//! 查询服务抽象为trait，默认实现按WGS84/UTM分带规则计算，
//! 兴趣区域是以该点为界的退化包围盒。

use crate::error::CrsError;

/// 投影CRS查询服务
pub trait CrsCatalog {
    /// 包含该点的UTM带EPSG候选码，按匹配度排序
    fn utm_candidates(&self, lon: f64, lat: f64) -> Vec<u32>;
}

/// WGS 84 基准的UTM分带目录
///
/// 北半球 EPSG 32601-32660，南半球 EPSG 32701-32760。
/// 分带计算涵盖挪威/斯瓦尔巴例外带。
#[derive(Debug, Default, Clone, Copy)]
pub struct Wgs84UtmCatalog;

impl CrsCatalog for Wgs84UtmCatalog {
    fn utm_candidates(&self, lon: f64, lat: f64) -> Vec<u32> {
        if !lon.is_finite() || !lat.is_finite() {
            return Vec::new();
        }
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Vec::new();
        }
        let zone = utm::lat_lon_to_zone_number(lat, lon) as u32;
        let epsg = if lat >= 0.0 { 32600 + zone } else { 32700 + zone };
        vec![epsg]
    }
}

/// 按原点解析图纸的EPSG代码
///
/// 取第一个候选码。对有效经纬度查询不应为空，
/// 为空时没有合理的回退，按硬错误处理。
pub fn resolve_utm_epsg(catalog: &dyn CrsCatalog, lon: f64, lat: f64) -> Result<u32, CrsError> {
    catalog
        .utm_candidates(lon, lat)
        .into_iter()
        .next()
        .ok_or(CrsError::NoUtmCandidate { lon, lat })
}
