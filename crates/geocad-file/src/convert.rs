//! DXF 实体到平面几何的转换
//!
//! 实体几何一律先转成本地坐标系下的 `geo` 几何：
//! 点、线段、多段线直接映射，圆/圆弧/椭圆/样条用线段近似。
//! 分类与有效性判定都在本地坐标完成，再整体变换到地理坐标。

use dxf::entities::{Entity as DxfEntity, EntityType};
use geo::{Coord, Geometry, Line as GeoLine, LineString, Point, Polygon};

/// 曲线近似的分段数
const CURVE_SEGMENTS: usize = 32;

/// 可转换的DXF实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Point,
    Line,
    LwPolyline,
    Polyline,
    Face3d,
    Circle,
    Arc,
    Ellipse,
    Spline,
    Hatch,
}

/// 提取遍历的固定类型顺序，多边形分类与文本关联依赖它
pub const CONVERTIBLE_KINDS: [EntityKind; 10] = [
    EntityKind::Point,
    EntityKind::Line,
    EntityKind::LwPolyline,
    EntityKind::Polyline,
    EntityKind::Face3d,
    EntityKind::Circle,
    EntityKind::Arc,
    EntityKind::Ellipse,
    EntityKind::Spline,
    EntityKind::Hatch,
];

pub fn kind_of(entity: &DxfEntity) -> Option<EntityKind> {
    match &entity.specific {
        EntityType::ModelPoint(_) => Some(EntityKind::Point),
        EntityType::Line(_) => Some(EntityKind::Line),
        EntityType::LwPolyline(_) => Some(EntityKind::LwPolyline),
        EntityType::Polyline(_) => Some(EntityKind::Polyline),
        EntityType::Face3D(_) => Some(EntityKind::Face3d),
        EntityType::Circle(_) => Some(EntityKind::Circle),
        EntityType::Arc(_) => Some(EntityKind::Arc),
        EntityType::Ellipse(_) => Some(EntityKind::Ellipse),
        EntityType::Spline(_) => Some(EntityKind::Spline),
        // dxf 0.6.1 未提供 HATCH 实体变体，无法分类
        _ => None,
    }
}

/// 实体几何（本地坐标），不可转换时为 `None`
pub fn entity_geometry(entity: &DxfEntity) -> Option<Geometry<f64>> {
    match &entity.specific {
        EntityType::ModelPoint(point) => {
            Some(Geometry::Point(Point::new(point.location.x, point.location.y)))
        }

        EntityType::Line(line) => Some(Geometry::LineString(LineString::new(vec![
            Coord {
                x: line.p1.x,
                y: line.p1.y,
            },
            Coord {
                x: line.p2.x,
                y: line.p2.y,
            },
        ]))),

        EntityType::LwPolyline(_) | EntityType::Polyline(_) => {
            let (points, closed) = polyline_points(entity)?;
            polyline_geometry(points, closed)
        }

        EntityType::Face3D(face) => {
            let corners = [
                &face.first_corner,
                &face.second_corner,
                &face.third_corner,
                &face.fourth_corner,
            ];
            let mut points: Vec<Coord<f64>> = Vec::with_capacity(4);
            for corner in corners {
                let coord = Coord {
                    x: corner.x,
                    y: corner.y,
                };
                if points.last() != Some(&coord) {
                    points.push(coord);
                }
            }
            polyline_geometry(points, true)
        }

        EntityType::Circle(circle) => {
            let mut points = Vec::with_capacity(CURVE_SEGMENTS + 1);
            for i in 0..CURVE_SEGMENTS {
                let angle = std::f64::consts::TAU * i as f64 / CURVE_SEGMENTS as f64;
                points.push(Coord {
                    x: circle.center.x + circle.radius * angle.cos(),
                    y: circle.center.y + circle.radius * angle.sin(),
                });
            }
            polyline_geometry(points, true)
        }

        EntityType::Arc(arc) => {
            let start = arc.start_angle.to_radians();
            let mut end = arc.end_angle.to_radians();
            if end <= start {
                end += std::f64::consts::TAU;
            }
            let step = (end - start) / CURVE_SEGMENTS as f64;
            let points = (0..=CURVE_SEGMENTS)
                .map(|i| {
                    let angle = start + step * i as f64;
                    Coord {
                        x: arc.center.x + arc.radius * angle.cos(),
                        y: arc.center.y + arc.radius * angle.sin(),
                    }
                })
                .collect();
            Some(Geometry::LineString(LineString::new(points)))
        }

        EntityType::Ellipse(ellipse) => {
            let major = (ellipse.major_axis.x, ellipse.major_axis.y);
            let minor = (
                -major.1 * ellipse.minor_axis_ratio,
                major.0 * ellipse.minor_axis_ratio,
            );
            let start = ellipse.start_parameter;
            let mut end = ellipse.end_parameter;
            if end <= start {
                end += std::f64::consts::TAU;
            }
            let full = (end - start) >= std::f64::consts::TAU - 1e-9;
            let at = |t: f64| Coord {
                x: ellipse.center.x + major.0 * t.cos() + minor.0 * t.sin(),
                y: ellipse.center.y + major.1 * t.cos() + minor.1 * t.sin(),
            };
            if full {
                let points = (0..CURVE_SEGMENTS)
                    .map(|i| at(start + std::f64::consts::TAU * i as f64 / CURVE_SEGMENTS as f64))
                    .collect();
                polyline_geometry(points, true)
            } else {
                let step = (end - start) / CURVE_SEGMENTS as f64;
                let points = (0..=CURVE_SEGMENTS).map(|i| at(start + step * i as f64)).collect();
                Some(Geometry::LineString(LineString::new(points)))
            }
        }

        EntityType::Spline(spline) => {
            // 线性近似：优先拟合点，其次控制点
            let source = if spline.fit_points.is_empty() {
                &spline.control_points
            } else {
                &spline.fit_points
            };
            if source.len() < 2 {
                return None;
            }
            let points = source
                .iter()
                .map(|p| Coord { x: p.x, y: p.y })
                .collect();
            Some(Geometry::LineString(LineString::new(points)))
        }

        // 边界路径codec不暴露，按不可转换跳过（dxf 0.6.1 无 HATCH 实体变体）
        _ => None,
    }
}

/// 多段线顶点与闭合标记（分类用，忽略凸度）
pub fn polyline_points(entity: &DxfEntity) -> Option<(Vec<Coord<f64>>, bool)> {
    match &entity.specific {
        EntityType::LwPolyline(poly) => {
            let points = poly
                .vertices
                .iter()
                .map(|v| Coord { x: v.x, y: v.y })
                .collect();
            Some((points, poly.is_closed()))
        }
        EntityType::Polyline(poly) => {
            let points = poly
                .vertices()
                .map(|v| Coord {
                    x: v.location.x,
                    y: v.location.y,
                })
                .collect();
            Some((points, poly.is_closed()))
        }
        _ => None,
    }
}

/// 多段线的轮廓属性：挤出厚度、全局宽度、标高
pub fn polyline_profile(entity: &DxfEntity) -> Option<(f64, f64, f64)> {
    match &entity.specific {
        EntityType::LwPolyline(poly) => {
            Some((poly.thickness, poly.constant_width, entity.common.elevation))
        }
        EntityType::Polyline(poly) => Some((
            poly.thickness,
            poly.default_starting_width,
            poly.location.z,
        )),
        _ => None,
    }
}

fn polyline_geometry(points: Vec<Coord<f64>>, closed: bool) -> Option<Geometry<f64>> {
    if closed && points.len() >= 3 {
        let mut ring = points;
        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        Some(Geometry::Polygon(Polygon::new(LineString::new(ring), vec![])))
    } else if points.len() >= 2 {
        Some(Geometry::LineString(LineString::new(points)))
    } else {
        None
    }
}

/// 闭合环转折线，降级进图层聚合时用
pub fn ring_to_line(polygon: &Polygon<f64>) -> Geometry<f64> {
    Geometry::LineString(polygon.exterior().clone())
}

/// 坐标逐点映射；单点失败即整体失败，调用方按不可转换处理
pub fn try_map_geometry<E>(
    geometry: &Geometry<f64>,
    f: &mut dyn FnMut(f64, f64) -> Result<(f64, f64), E>,
) -> Result<Geometry<f64>, E> {
    fn map_line_string<E>(
        line: &LineString<f64>,
        f: &mut dyn FnMut(f64, f64) -> Result<(f64, f64), E>,
    ) -> Result<LineString<f64>, E> {
        let mut coords = Vec::with_capacity(line.0.len());
        for c in &line.0 {
            let (x, y) = f(c.x, c.y)?;
            coords.push(Coord { x, y });
        }
        Ok(LineString::new(coords))
    }

    fn map_polygon<E>(
        polygon: &Polygon<f64>,
        f: &mut dyn FnMut(f64, f64) -> Result<(f64, f64), E>,
    ) -> Result<Polygon<f64>, E> {
        let exterior = map_line_string(polygon.exterior(), f)?;
        let mut interiors = Vec::with_capacity(polygon.interiors().len());
        for ring in polygon.interiors() {
            interiors.push(map_line_string(ring, f)?);
        }
        Ok(Polygon::new(exterior, interiors))
    }

    Ok(match geometry {
        Geometry::Point(p) => {
            let (x, y) = f(p.x(), p.y())?;
            Geometry::Point(Point::new(x, y))
        }
        Geometry::Line(l) => {
            let (sx, sy) = f(l.start.x, l.start.y)?;
            let (ex, ey) = f(l.end.x, l.end.y)?;
            Geometry::Line(GeoLine::new(Coord { x: sx, y: sy }, Coord { x: ex, y: ey }))
        }
        Geometry::LineString(l) => Geometry::LineString(map_line_string(l, f)?),
        Geometry::Polygon(p) => Geometry::Polygon(map_polygon(p, f)?),
        Geometry::MultiPoint(points) => {
            let mut mapped = Vec::with_capacity(points.0.len());
            for p in &points.0 {
                let (x, y) = f(p.x(), p.y())?;
                mapped.push(Point::new(x, y));
            }
            Geometry::MultiPoint(mapped.into())
        }
        Geometry::MultiLineString(lines) => {
            let mut mapped = Vec::with_capacity(lines.0.len());
            for l in &lines.0 {
                mapped.push(map_line_string(l, f)?);
            }
            Geometry::MultiLineString(geo::MultiLineString::new(mapped))
        }
        Geometry::MultiPolygon(polygons) => {
            let mut mapped = Vec::with_capacity(polygons.0.len());
            for p in &polygons.0 {
                mapped.push(map_polygon(p, f)?);
            }
            Geometry::MultiPolygon(mapped.into())
        }
        Geometry::GeometryCollection(collection) => {
            let mut mapped = Vec::with_capacity(collection.0.len());
            for g in &collection.0 {
                mapped.push(try_map_geometry(g, f)?);
            }
            Geometry::GeometryCollection(mapped.into_iter().collect())
        }
        Geometry::Rect(r) => Geometry::Polygon(map_polygon(&r.to_polygon(), f)?),
        Geometry::Triangle(t) => Geometry::Polygon(map_polygon(&t.to_polygon(), f)?),
    })
}

/// 块插入的仿射变换：缩放 → 旋转 → 平移
///
/// 旋转为度，逆时针，与 INSERT 实体约定一致。
pub fn insert_transform(
    geometry: &Geometry<f64>,
    x_scale: f64,
    y_scale: f64,
    rotation_degrees: f64,
    location: (f64, f64),
) -> Geometry<f64> {
    let (s, c) = rotation_degrees.to_radians().sin_cos();
    let result = try_map_geometry::<std::convert::Infallible>(geometry, &mut |x, y| {
        let (x, y) = (x * x_scale, y * y_scale);
        let (x, y) = (c * x - s * y, s * x + c * y);
        Ok((location.0 + x, location.1 + y))
    });
    match result {
        Ok(mapped) => mapped,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxf::entities::{Circle, Line, LwPolyline};
    use dxf::LwPolylineVertex;

    fn lw_polyline(points: &[(f64, f64)], closed: bool) -> DxfEntity {
        let mut poly = LwPolyline::default();
        poly.vertices = points
            .iter()
            .map(|&(x, y)| LwPolylineVertex {
                x,
                y,
                ..Default::default()
            })
            .collect();
        poly.set_is_closed(closed);
        DxfEntity::new(EntityType::LwPolyline(poly))
    }

    #[test]
    fn test_line_to_line_string() {
        let mut line = Line::default();
        line.p1 = dxf::Point::new(0.0, 0.0, 0.0);
        line.p2 = dxf::Point::new(10.0, 5.0, 0.0);
        let entity = DxfEntity::new(EntityType::Line(line));
        match entity_geometry(&entity) {
            Some(Geometry::LineString(ls)) => assert_eq!(ls.0.len(), 2),
            other => panic!("expected line string, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_polyline_to_polygon() {
        let entity = lw_polyline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)], true);
        match entity_geometry(&entity) {
            Some(Geometry::Polygon(p)) => {
                // 环闭合
                assert_eq!(p.exterior().0.first(), p.exterior().0.last());
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_open_polyline_to_line_string() {
        let entity = lw_polyline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], false);
        assert!(matches!(
            entity_geometry(&entity),
            Some(Geometry::LineString(_))
        ));
    }

    #[test]
    fn test_degenerate_polyline_dropped() {
        let entity = lw_polyline(&[(0.0, 0.0)], false);
        assert!(entity_geometry(&entity).is_none());
    }

    #[test]
    fn test_circle_to_polygon() {
        let mut circle = Circle::default();
        circle.center = dxf::Point::new(5.0, 5.0, 0.0);
        circle.radius = 2.0;
        let entity = DxfEntity::new(EntityType::Circle(circle));
        match entity_geometry(&entity) {
            Some(Geometry::Polygon(p)) => {
                for c in &p.exterior().0 {
                    let r = ((c.x - 5.0).powi(2) + (c.y - 5.0).powi(2)).sqrt();
                    assert!((r - 2.0).abs() < 1e-9);
                }
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_kind_order() {
        assert_eq!(CONVERTIBLE_KINDS[0], EntityKind::Point);
        assert_eq!(CONVERTIBLE_KINDS[2], EntityKind::LwPolyline);
        assert_eq!(CONVERTIBLE_KINDS[9], EntityKind::Hatch);
    }

    #[test]
    fn test_insert_transform_scale_rotate_translate() {
        let geometry = Geometry::Point(Point::new(1.0, 0.0));
        // 缩放2倍，旋转90度，平移(10, 20)
        let moved = insert_transform(&geometry, 2.0, 2.0, 90.0, (10.0, 20.0));
        match moved {
            Geometry::Point(p) => {
                assert!((p.x() - 10.0).abs() < 1e-9);
                assert!((p.y() - 22.0).abs() < 1e-9);
            }
            other => panic!("expected point, got {other:?}"),
        }
    }
}
