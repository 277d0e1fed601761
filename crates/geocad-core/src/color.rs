//! CAD 默认颜色表
//!
//! AutoCAD 颜色索引 (ACI) 到 RGB 的映射：
//! - 0: ByBlock
//! - 1-9: 标准色
//! - 10-249: 24个色相 × 5档亮度 × 正常/淡彩
//! - 250-255: 灰阶
//!
//! 十六进制输出约定：RGB元组渲染为小写 `#rrggbb`，
//! 索引色渲染为大写 `#RRGGBB`。

/// 10-249 区间的五档亮度
const SHADE_VALUES: [f64; 5] = [255.0, 189.0, 129.0, 104.0, 79.0];

/// 250-255 灰阶
const GRAYS: [u8; 6] = [51, 91, 132, 173, 214, 255];

/// 60°扇区线性渐变求满饱和度色相
fn hue_rgb(angle_deg: f64, v: f64) -> (f64, f64, f64) {
    let h = (angle_deg % 360.0) / 60.0;
    let f = h - h.floor();
    match h.floor() as u32 % 6 {
        0 => (v, v * f, 0.0),
        1 => (v * (1.0 - f), v, 0.0),
        2 => (0.0, v, v * f),
        3 => (0.0, v * (1.0 - f), v),
        4 => (v * f, 0.0, v),
        _ => (v, 0.0, v * (1.0 - f)),
    }
}

/// 颜色索引 → RGB
pub fn aci_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0 => (0, 0, 0),
        1 => (255, 0, 0),
        2 => (255, 255, 0),
        3 => (0, 255, 0),
        4 => (0, 255, 255),
        5 => (0, 0, 255),
        6 => (255, 0, 255),
        7 => (255, 255, 255),
        8 => (128, 128, 128),
        9 => (192, 192, 192),
        250..=255 => {
            let g = GRAYS[(index - 250) as usize];
            (g, g, g)
        }
        i => {
            let i = i - 10;
            let v = SHADE_VALUES[(i % 10 / 2) as usize];
            let angle = (i / 10) as f64 * 15.0;
            let (mut r, mut g, mut b) = hue_rgb(angle, v);
            if i % 2 == 1 {
                // 淡彩：各通道向灰靠拢三分之二
                r += (v - r) * 2.0 / 3.0;
                g += (v - g) * 2.0 / 3.0;
                b += (v - b) * 2.0 / 3.0;
            }
            (r.round() as u8, g.round() as u8, b.round() as u8)
        }
    }
}

/// RGB元组 → 小写十六进制
pub fn rgb_to_hex(rgb: (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.0, rgb.1, rgb.2)
}

/// 颜色索引 → 大写十六进制
pub fn aci_to_hex(index: u8) -> String {
    let (r, g, b) = aci_rgb(index);
    let rgb24 = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
    format!("#{:06X}", rgb24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_tuple_lowercase() {
        assert_eq!(rgb_to_hex((128, 128, 128)), "#808080");
        assert_eq!(rgb_to_hex((255, 171, 0)), "#ffab00");
    }

    #[test]
    fn test_aci_standard_colors() {
        assert_eq!(aci_to_hex(1), "#FF0000");
        assert_eq!(aci_to_hex(5), "#0000FF");
        assert_eq!(aci_to_hex(7), "#FFFFFF");
        assert_eq!(aci_to_hex(8), "#808080");
    }

    #[test]
    fn test_aci_shades() {
        // 红色系：明亮、淡彩、最暗
        assert_eq!(aci_rgb(10), (255, 0, 0));
        assert_eq!(aci_rgb(11), (255, 170, 170));
        assert_eq!(aci_rgb(18), (79, 0, 0));
        assert_eq!(aci_rgb(19), (79, 53, 53));
        // 中间色相落在扇区渐变上
        assert_eq!(aci_rgb(140), (0, 191, 255));
    }

    #[test]
    fn test_aci_grays() {
        assert_eq!(aci_to_hex(250), "#333333");
        assert_eq!(aci_to_hex(255), "#FFFFFF");
    }

    #[test]
    fn test_aci_uppercase() {
        assert_eq!(aci_to_hex(140), "#00BFFF");
    }
}
