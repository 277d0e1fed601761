//! DXF 原始文本层
//!
//! 自己解析 DXF 组码-值对，用于 `dxf` crate 不覆盖的对象
//! （这里是 OBJECTS 段中的 GEODATA）。
//!
//! # DXF 文件结构
//!
//! 文件由多个段 (Section) 组成，每个数据项两行：
//! - 第一行：组码（数字）
//! - 第二行：值
//!
//! ```text
//! 0
//! SECTION
//! 2
//! OBJECTS         ← 对象（包括 GEODATA）
//! ...
//! 0
//! ENDSEC
//! 0
//! EOF
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::FileError;

/// DXF 组码-值对
#[derive(Debug, Clone)]
pub struct DxfPair {
    pub code: i32,
    pub value: String,
}

impl DxfPair {
    pub fn new(code: i32, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    /// 解析为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    /// 解析为整数
    pub fn as_i32(&self) -> Option<i32> {
        self.value.trim().parse().ok()
    }
}

/// 整个文件的组码-值对序列
///
/// 保留全部内容，局部改写后原样序列化回 ASCII 文本。
#[derive(Debug, Clone, Default)]
pub struct RawDxf {
    pairs: Vec<DxfPair>,
}

impl RawDxf {
    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Self::parse(reader)
    }

    /// 从文本解析
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, FileError> {
        let mut pairs = Vec::new();
        let mut lines = reader.lines();

        loop {
            // 读取组码
            let code_line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(FileError::Io(e)),
                None => break,
            };

            // 读取值
            let value_line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(FileError::Io(e)),
                None => break,
            };

            let code: i32 = code_line.trim().parse().map_err(|_| {
                FileError::InvalidFormat(format!("Invalid group code: {}", code_line))
            })?;

            pairs.push(DxfPair::new(code, value_line));

            // 检查是否到达文件末尾
            if code == 0 && pairs.last().map(|p| p.value.trim()) == Some("EOF") {
                break;
            }
        }

        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[DxfPair] {
        &self.pairs
    }

    /// 找到指定类型对象的组码范围（`0 NAME` 起，到下一个组码 0 为止）
    pub fn find_object(&self, name: &str) -> Option<Range<usize>> {
        let start = self
            .pairs
            .iter()
            .position(|p| p.code == 0 && p.value.trim() == name)?;
        let end = self.pairs[start + 1..]
            .iter()
            .position(|p| p.code == 0)
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.pairs.len());
        Some(start..end)
    }

    /// 删除指定类型的所有对象
    pub fn remove_objects(&mut self, name: &str) {
        while let Some(range) = self.find_object(name) {
            self.pairs.drain(range);
        }
    }

    /// 把对象插入 OBJECTS 段；没有该段时在 EOF 前新建
    pub fn insert_object(&mut self, object: Vec<DxfPair>) {
        let objects_pos = self.pairs.windows(2).position(|w| {
            w[0].code == 0
                && w[0].value.trim() == "SECTION"
                && w[1].code == 2
                && w[1].value.trim() == "OBJECTS"
        });
        match objects_pos {
            Some(pos) => {
                // 段头两对之后
                self.pairs.splice(pos + 2..pos + 2, object);
            }
            None => {
                let eof = self
                    .pairs
                    .iter()
                    .position(|p| p.code == 0 && p.value.trim() == "EOF")
                    .unwrap_or(self.pairs.len());
                let mut section = vec![
                    DxfPair::new(0, "SECTION"),
                    DxfPair::new(2, "OBJECTS"),
                ];
                section.extend(object);
                section.push(DxfPair::new(0, "ENDSEC"));
                self.pairs.splice(eof..eof, section);
            }
        }
    }

    /// 序列化为 ASCII DXF 文本
    pub fn to_text(&self) -> String {
        let mut output = Vec::with_capacity(self.pairs.len() * 2);
        for pair in &self.pairs {
            output.push(format!("{:>3}", pair.code));
            output.push(pair.value.clone());
        }
        output.push(String::new());
        output.join("\n")
    }

    /// 保存到文件
    pub fn save(&self, path: &Path) -> Result<(), FileError> {
        let mut file = File::create(path)?;
        file.write_all(self.to_text().as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MINIMAL: &str = "0\nSECTION\n2\nOBJECTS\n0\nDICTIONARY\n5\nC\n0\nENDSEC\n0\nEOF\n";

    #[test]
    fn test_parse_pair() {
        let pair = DxfPair::new(10, "100.5");
        assert_eq!(pair.as_f64(), Some(100.5));

        let pair = DxfPair::new(70, "42");
        assert_eq!(pair.as_i32(), Some(42));
    }

    #[test]
    fn test_parse_and_reserialize() {
        let raw = RawDxf::parse(Cursor::new(MINIMAL)).expect("parse");
        assert_eq!(raw.pairs().len(), 6);
        let text = raw.to_text();
        assert!(text.contains("OBJECTS"));
        assert!(text.contains("EOF"));
    }

    #[test]
    fn test_find_and_remove_object() {
        let mut raw = RawDxf::parse(Cursor::new(MINIMAL)).expect("parse");
        assert!(raw.find_object("DICTIONARY").is_some());
        raw.remove_objects("DICTIONARY");
        assert!(raw.find_object("DICTIONARY").is_none());
        // 段结构保持完整
        assert!(raw.to_text().contains("ENDSEC"));
    }

    #[test]
    fn test_insert_object_into_existing_section() {
        let mut raw = RawDxf::parse(Cursor::new(MINIMAL)).expect("parse");
        raw.insert_object(vec![DxfPair::new(0, "GEODATA"), DxfPair::new(90, "3")]);
        let range = raw.find_object("GEODATA").expect("inserted");
        assert_eq!(range.len(), 2);
    }

    #[test]
    fn test_insert_object_creates_section() {
        let mut raw = RawDxf::parse(Cursor::new("0\nEOF\n")).expect("parse");
        raw.insert_object(vec![DxfPair::new(0, "GEODATA")]);
        let text = raw.to_text();
        assert!(text.contains("OBJECTS"));
        let geodata = text.find("GEODATA").expect("object");
        let eof = text.find("EOF").expect("eof");
        assert!(geodata < eof);
    }

    #[test]
    fn test_invalid_group_code() {
        let result = RawDxf::parse(Cursor::new("abc\nvalue\n"));
        assert!(result.is_err());
    }
}
