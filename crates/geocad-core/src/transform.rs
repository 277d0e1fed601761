//! 坐标变换
//!
//! 两级变换把图纸几何送到地图上：
//! 1. `WcsTransform`: 图纸本地坐标系 (WCS) ↔ 投影坐标系的仿射变换，
//!    由参照点、设计点与北方向角确定
//! 2. `Projection`: 投影坐标系 ↔ WGS84 经纬度，始终xy顺序
//!
//! 北方向约定：旋转角是本地北相对真北的方位角。
//! 北方向向量为 `(sin rot, cos rot)`，反解用 `atan2(x, y)`，
//! 参数顺序与常规 `atan2(y, x)` 相反，两处必须保持互逆。

use serde::{Deserialize, Serialize};

use crate::error::CrsError;

/// WGS84 与 UTM 投影坐标系之间的投影
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Projection {
    epsg: u32,
    zone: u8,
    northern: bool,
}

impl Projection {
    /// 从EPSG代码构造UTM投影
    ///
    /// 只接受 WGS84 UTM 带（EPSG 32601-32660 北，32701-32760 南）。
    pub fn utm(epsg: u32) -> Result<Self, CrsError> {
        match epsg {
            32601..=32660 => Ok(Self {
                epsg,
                zone: (epsg - 32600) as u8,
                northern: true,
            }),
            32701..=32760 => Ok(Self {
                epsg,
                zone: (epsg - 32700) as u8,
                northern: false,
            }),
            other => Err(CrsError::UnsupportedCrs(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// WGS84 → 投影坐标（东距、北距）
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> Result<(f64, f64), CrsError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(CrsError::Projection(format!(
                "non-finite coordinate ({lon}, {lat})"
            )));
        }
        let (northing, easting, _convergence) = utm::to_utm_wgs84(lat, lon, self.zone);
        Ok((easting, northing))
    }

    /// 投影坐标 → WGS84（经度、纬度）
    pub fn to_wgs84(&self, easting: f64, northing: f64) -> Result<(f64, f64), CrsError> {
        // 区带字母只用来区分南北半球
        let letter = if self.northern { 'N' } else { 'H' };
        let (lat, lon) = utm::wsg84_utm_to_lat_lon(easting, northing, self.zone, letter)
            .map_err(|e| CrsError::Projection(format!("{e:?}")))?;
        Ok((lon, lat))
    }
}

/// 图纸本地坐标系与投影坐标系之间的仿射变换
///
/// 设计点是DXF里锚定的本地坐标，参照点是它对应的投影坐标。
/// 旋转为弧度，自真北顺时针。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WcsTransform {
    /// 参照点（投影坐标系，东距/北距）
    pub reference: (f64, f64),
    /// 设计点（本地单位）
    pub design: (f64, f64),
    /// 旋转，弧度
    pub rotation: f64,
}

impl WcsTransform {
    pub fn new(reference: (f64, f64), design: (f64, f64), rotation: f64) -> Self {
        Self {
            reference,
            design,
            rotation,
        }
    }

    /// 北方向向量 `(sin rot, cos rot)`
    pub fn north_direction(&self) -> (f64, f64) {
        (self.rotation.sin(), self.rotation.cos())
    }

    /// 从北方向向量反解旋转角（弧度）
    ///
    /// 方位角自真北起算，所以是 `atan2(x, y)` 而非 `atan2(y, x)`。
    pub fn rotation_from_north(north: (f64, f64)) -> f64 {
        north.0.atan2(north.1)
    }

    /// 本地坐标 → 投影坐标
    pub fn wcs_to_crs(&self, x: f64, y: f64) -> (f64, f64) {
        let (s, c) = self.rotation.sin_cos();
        let dx = x - self.design.0;
        let dy = y - self.design.1;
        (
            self.reference.0 + dx * c + dy * s,
            self.reference.1 - dx * s + dy * c,
        )
    }

    /// 投影坐标 → 本地坐标
    pub fn crs_to_wcs(&self, easting: f64, northing: f64) -> (f64, f64) {
        let (s, c) = self.rotation.sin_cos();
        let de = easting - self.reference.0;
        let dn = northing - self.reference.1;
        (
            self.design.0 + de * c - dn * s,
            self.design.1 + de * s + dn * c,
        )
    }
}

/// 图纸的整套变换：投影对 + 本地锚定
#[derive(Debug, Clone, Copy)]
pub struct DrawingTransforms {
    pub projection: Projection,
    /// 原点投影到本地CRS的坐标，即DXF设计点对应的真实坐标
    pub anchor: (f64, f64),
    pub design: (f64, f64),
    /// 弧度
    pub rotation: f64,
}

impl DrawingTransforms {
    /// 构建图纸的正反投影与锚点
    ///
    /// `origin` 为WGS84经度/纬度，`rotation_degrees` 只在此处
    /// 换算一次弧度，供北方向向量复用。
    pub fn build(
        epsg: u32,
        origin: (f64, f64),
        design: (f64, f64),
        rotation_degrees: f64,
    ) -> Result<Self, CrsError> {
        let projection = Projection::utm(epsg)?;
        let anchor = projection.from_wgs84(origin.0, origin.1)?;
        Ok(Self {
            projection,
            anchor,
            design,
            rotation: rotation_degrees.to_radians(),
        })
    }

    pub fn north_direction(&self) -> (f64, f64) {
        (self.rotation.sin(), self.rotation.cos())
    }

    pub fn wcs_transform(&self) -> WcsTransform {
        WcsTransform::new(self.anchor, self.design, self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_rejects_non_utm() {
        assert!(Projection::utm(4326).is_err());
        assert!(Projection::utm(32661).is_err());
    }

    #[test]
    fn test_projection_round_trip() {
        let proj = Projection::utm(32633).expect("utm");
        let (e, n) = proj.from_wgs84(12.0, 42.0).expect("forward");
        let (lon, lat) = proj.to_wgs84(e, n).expect("inverse");
        assert!((lon - 12.0).abs() < 1e-6);
        assert!((lat - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_projection_known_points() {
        // EPSG 32633 已知点位：正投影与反投影各对一个基准值
        let proj = Projection::utm(32633).expect("utm");
        let (e, n) = proj.from_wgs84(12.0, 42.0).expect("forward");
        assert!((e - 251535.07928761785).abs() < 0.05);
        assert!((n - 4654130.8913233075).abs() < 0.05);

        let (lon, lat) = proj
            .to_wgs84(291187.7155651262, 4640994.318375054)
            .expect("inverse");
        assert!((lon - 12.48293852819188).abs() < 1e-6);
        assert!(lat > 41.8 && lat < 42.0);
    }

    #[test]
    fn test_southern_hemisphere_round_trip() {
        let proj = Projection::utm(32756).expect("utm");
        let (e, n) = proj.from_wgs84(151.2, -33.9).expect("forward");
        let (lon, lat) = proj.to_wgs84(e, n).expect("inverse");
        assert!((lon - 151.2).abs() < 1e-6);
        assert!((lat + 33.9).abs() < 1e-6);
    }

    #[test]
    fn test_north_direction_round_trip() {
        // 读取几何数据用 atan2(x, y)，写回用 (sin rot, cos rot)，二者必须互逆
        for degrees in [-150.0, -45.0, 0.0, 30.0, 90.0, 179.0] {
            let rot = f64::to_radians(degrees);
            let tf = WcsTransform::new((0.0, 0.0), (0.0, 0.0), rot);
            let north = tf.north_direction();
            let back = WcsTransform::rotation_from_north(north);
            assert!((back - rot).abs() < 1e-12, "rotation {degrees}");
        }
    }

    #[test]
    fn test_wcs_round_trip_with_rotation() {
        let tf = WcsTransform::new((251535.08, 4654130.89), (10.0, -5.0), 0.5);
        let (e, n) = tf.wcs_to_crs(123.4, 56.7);
        let (x, y) = tf.crs_to_wcs(e, n);
        assert!((x - 123.4).abs() < 1e-9);
        assert!((y - 56.7).abs() < 1e-9);
    }

    #[test]
    fn test_wcs_design_point_maps_to_reference() {
        let tf = WcsTransform::new((1000.0, 2000.0), (10.0, 20.0), 0.25);
        let (e, n) = tf.wcs_to_crs(10.0, 20.0);
        assert!((e - 1000.0).abs() < 1e-12);
        assert!((n - 2000.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawing_transforms_anchor() {
        let tf = DrawingTransforms::build(32633, (12.0, 42.0), (0.0, 0.0), 90.0).expect("build");
        let (north_x, north_y) = tf.north_direction();
        assert!((north_x - 1.0).abs() < 1e-12);
        assert!(north_y.abs() < 1e-12);
        // 锚点应落在33带内合理范围
        assert!(tf.anchor.0 > 100_000.0 && tf.anchor.0 < 900_000.0);
        assert!(tf.anchor.1 > 4_000_000.0 && tf.anchor.1 < 5_000_000.0);
    }
}
