//! GEODATA 对象
//!
//! DXF 把地理参照存成 OBJECTS 段中的 GEODATA 对象：
//! 设计点（本地WCS坐标）、参照点（投影坐标）、北方向向量、
//! 以及一段坐标系字典XML。这里负责它的解析与合成。
//!
//! 常用组码：
//! - 10/20/30: 设计点
//! - 11/21/31: 参照点
//! - 12/22: 北方向向量（2D）
//! - 303.../301: 坐标系定义字符串（分块，301 结尾）

use crate::error::FileError;
use crate::raw::{DxfPair, RawDxf};

/// 坐标系定义字符串的分块长度
const CHUNK_LEN: usize = 250;

/// 图纸内嵌的地理参照数据
#[derive(Debug, Clone, PartialEq)]
pub struct GeoData {
    /// 设计点，本地WCS坐标
    pub design_point: (f64, f64, f64),
    /// 参照点，投影坐标系坐标
    pub reference_point: (f64, f64, f64),
    /// 北方向向量，自真北起算的方位
    pub north_direction: (f64, f64),
    /// 坐标系字典XML
    pub coordinate_system_definition: String,
}

impl Default for GeoData {
    fn default() -> Self {
        Self {
            design_point: (0.0, 0.0, 0.0),
            reference_point: (0.0, 0.0, 0.0),
            north_direction: (0.0, 1.0),
            coordinate_system_definition: String::new(),
        }
    }
}

impl GeoData {
    /// 旋转角（度）
    ///
    /// 北方向是自真北起算的方位向量，所以是 `atan2(x, y)`。
    pub fn rotation_degrees(&self) -> f64 {
        self.north_direction
            .0
            .atan2(self.north_direction.1)
            .to_degrees()
    }

    /// 从坐标系XML解析 EPSG 代码与轴序
    ///
    /// 返回 `(epsg, xy轴序)`。XML格式错误或缺少轴序元数据
    /// 都按无效地理数据处理。
    pub fn crs(&self) -> Result<(u32, bool), FileError> {
        let xml = &self.coordinate_system_definition;
        let object_id = extract_between(xml, "<ObjectId>", "</ObjectId>")
            .ok_or_else(|| FileError::InvalidGeodata("missing ObjectId".to_string()))?;
        let epsg: u32 = object_id
            .trim()
            .strip_prefix("EPSG=")
            .ok_or_else(|| {
                FileError::InvalidGeodata(format!("ObjectId is not an EPSG alias: {object_id}"))
            })?
            .trim()
            .parse()
            .map_err(|_| {
                FileError::InvalidGeodata(format!("malformed EPSG code: {object_id}"))
            })?;

        // 第一轴必须声明，east 在前为 xy 轴序
        let first_axis = extract_between(xml, "<AxisOrder>1</AxisOrder>", "</CoordinateSystemAxis>")
            .ok_or_else(|| FileError::InvalidGeodata("missing axis order".to_string()))?;
        let axis_name = extract_between(first_axis, "<AxisName>", "</AxisName>")
            .ok_or_else(|| FileError::InvalidGeodata("missing axis name".to_string()))?;
        let xy = axis_name.trim().eq_ignore_ascii_case("easting");
        Ok((epsg, xy))
    }
}

/// 以 EPSG 代码生成最小坐标系字典XML
///
/// 固定模板，只有 EPSG 数字变化。
pub fn epsg_xml(epsg: u32) -> String {
    format!(
        r#"<?xml version="1.0"
encoding="UTF-16" standalone="no" ?>
<Dictionary version="1.0" xmlns="http://www.osgeo.org/mapguide/coordinatesystem">
<Alias id="{epsg}" type="CoordinateSystem">
<ObjectId>EPSG={epsg}</ObjectId>
<Namespace>EPSG Code</Namespace>
</Alias>
<Axis uom="METER">
<CoordinateSystemAxis>
<AxisOrder>1</AxisOrder>
<AxisName>Easting</AxisName>
<AxisAbbreviation>E</AxisAbbreviation>
<AxisDirection>east</AxisDirection>
</CoordinateSystemAxis>
<CoordinateSystemAxis>
<AxisOrder>2</AxisOrder>
<AxisName>Northing</AxisName>
<AxisAbbreviation>N</AxisAbbreviation>
<AxisDirection>north</AxisDirection>
</CoordinateSystemAxis>
</Axis>
</Dictionary>"#
    )
}

/// 从原始组码层解析 GEODATA 对象
pub fn parse_geodata(raw: &RawDxf) -> Option<GeoData> {
    let range = raw.find_object("GEODATA")?;
    let mut geodata = GeoData::default();
    let mut xml = String::new();
    for pair in &raw.pairs()[range.start + 1..range.end] {
        match pair.code {
            10 => geodata.design_point.0 = pair.as_f64()?,
            20 => geodata.design_point.1 = pair.as_f64()?,
            30 => geodata.design_point.2 = pair.as_f64()?,
            11 => geodata.reference_point.0 = pair.as_f64()?,
            21 => geodata.reference_point.1 = pair.as_f64()?,
            31 => geodata.reference_point.2 = pair.as_f64()?,
            12 => geodata.north_direction.0 = pair.as_f64()?,
            22 => geodata.north_direction.1 = pair.as_f64()?,
            301 | 303 => xml.push_str(&pair.value),
            _ => {}
        }
    }
    geodata.coordinate_system_definition = xml;
    Some(geodata)
}

/// 合成 GEODATA 对象的组码序列
pub fn geodata_pairs(geodata: &GeoData) -> Vec<DxfPair> {
    let mut pairs = vec![
        DxfPair::new(0, "GEODATA"),
        DxfPair::new(100, "AcDbGeoData"),
        DxfPair::new(90, "3"),
        DxfPair::new(70, "3"),
        DxfPair::new(10, geodata.design_point.0.to_string()),
        DxfPair::new(20, geodata.design_point.1.to_string()),
        DxfPair::new(30, geodata.design_point.2.to_string()),
        DxfPair::new(11, geodata.reference_point.0.to_string()),
        DxfPair::new(21, geodata.reference_point.1.to_string()),
        DxfPair::new(31, geodata.reference_point.2.to_string()),
        DxfPair::new(40, "1.0"),
        DxfPair::new(41, "1.0"),
        DxfPair::new(12, geodata.north_direction.0.to_string()),
        DxfPair::new(22, geodata.north_direction.1.to_string()),
    ];
    // 组码值不能含换行，压成单行后分块
    let xml = geodata.coordinate_system_definition.replace('\n', " ");
    let bytes = xml.as_bytes();
    let chunks: Vec<&[u8]> = bytes.chunks(CHUNK_LEN).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let code = if i + 1 == chunks.len() { 301 } else { 303 };
        let value = String::from_utf8_lossy(chunk).to_string();
        pairs.push(DxfPair::new(code, value));
    }
    if chunks.is_empty() {
        pairs.push(DxfPair::new(301, ""));
    }
    pairs
}

/// 把 GEODATA 对象写入（或替换进）原始组码层
pub fn splice_geodata(raw: &mut RawDxf, geodata: &GeoData) {
    raw.remove_objects("GEODATA");
    raw.insert_object(geodata_pairs(geodata));
}

fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GeoData {
        GeoData {
            design_point: (0.0, 0.0, 0.0),
            reference_point: (251535.08, 4654130.89, 0.0),
            north_direction: (0.0, 1.0),
            coordinate_system_definition: epsg_xml(32633),
        }
    }

    #[test]
    fn test_crs_from_template() {
        let (epsg, xy) = sample().crs().expect("valid");
        assert_eq!(epsg, 32633);
        assert!(xy);
    }

    #[test]
    fn test_crs_missing_object_id() {
        let mut geodata = sample();
        geodata.coordinate_system_definition = "<Dictionary></Dictionary>".to_string();
        assert!(geodata.crs().is_err());
    }

    #[test]
    fn test_crs_missing_axis_order() {
        let mut geodata = sample();
        geodata.coordinate_system_definition =
            "<Alias id=\"32633\"><ObjectId>EPSG=32633</ObjectId></Alias>".to_string();
        assert!(geodata.crs().is_err());
    }

    #[test]
    fn test_crs_non_epsg_alias() {
        let mut geodata = sample();
        geodata.coordinate_system_definition =
            "<ObjectId>LL84</ObjectId><AxisOrder>1</AxisOrder>".to_string();
        assert!(geodata.crs().is_err());
    }

    #[test]
    fn test_rotation_from_north_direction() {
        let mut geodata = sample();
        assert!((geodata.rotation_degrees() - 0.0).abs() < 1e-12);
        // 北方向指向正东：方位角 90 度
        geodata.north_direction = (1.0, 0.0);
        assert!((geodata.rotation_degrees() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_splice_round_trip() {
        use std::io::Cursor;
        let mut raw = RawDxf::parse(Cursor::new("0\nSECTION\n2\nOBJECTS\n0\nENDSEC\n0\nEOF\n"))
            .expect("parse");
        let geodata = sample();
        splice_geodata(&mut raw, &geodata);

        let parsed = parse_geodata(&raw).expect("geodata present");
        assert_eq!(parsed.reference_point, geodata.reference_point);
        assert_eq!(parsed.north_direction, geodata.north_direction);
        let (epsg, xy) = parsed.crs().expect("valid crs");
        assert_eq!(epsg, 32633);
        assert!(xy);

        // 重复拼接不产生重复对象
        splice_geodata(&mut raw, &geodata);
        let text = raw.to_text();
        assert_eq!(text.matches("GEODATA").count(), 1);
    }
}
