//! GeoCAD 命令行入口
//!
//! 注册DXF图纸、解析坐标系、提取要素，导出CSV/GeoJSON。

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geo::Point;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use geocad_core::model::Drawing;
use geocad_core::store::MemoryStore;
use geocad_engine::export::{feature_collection, write_csv, write_polyline_profile_csv};
use geocad_engine::GeoreferenceService;
use geocad_file::CadDocument;

#[derive(Parser)]
#[command(name = "geocad", about = "DXF图纸地理参照与要素提取", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 注册图纸并提取要素
    Ingest {
        /// DXF文件路径
        dxf: PathBuf,
        /// 图纸名，缺省用文件名
        #[arg(long)]
        title: Option<String>,
        /// 地图原点 "经度,纬度"（没有内嵌地理数据时用）
        #[arg(long)]
        origin: Option<String>,
        /// 设计点偏移 "x,y"
        #[arg(long)]
        design: Option<String>,
        /// 旋转（度）
        #[arg(long, default_value_t = 0.0)]
        rotation: f64,
        /// 要素表输出路径
        #[arg(long)]
        csv: Option<PathBuf>,
        /// GeoJSON输出路径
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// 打印DXF文件的图层与地理数据摘要
    Info {
        dxf: PathBuf,
    },
    /// 开放多段线的轮廓报表
    Profile {
        dxf: PathBuf,
        /// 输出路径，缺省打印到标准输出
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn parse_pair(value: &str, what: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        bail!("{what} must be two comma separated numbers, got {value:?}");
    }
    let x: f64 = parts[0].parse().with_context(|| format!("bad {what}: {value}"))?;
    let y: f64 = parts[1].parse().with_context(|| format!("bad {what}: {value}"))?;
    Ok((x, y))
}

fn ingest(
    dxf: PathBuf,
    title: Option<String>,
    origin: Option<String>,
    design: Option<String>,
    rotation: f64,
    csv: Option<PathBuf>,
    geojson: Option<PathBuf>,
) -> Result<()> {
    let title = title.unwrap_or_else(|| {
        dxf.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "drawing".to_string())
    });
    let mut drawing = Drawing::new(title, &dxf);
    if let Some(origin) = origin {
        let (lon, lat) = parse_pair(&origin, "origin")?;
        drawing.origin = Some(Point::new(lon, lat));
    }
    if let Some(design) = design {
        let (x, y) = parse_pair(&design, "design point")?;
        drawing.design_x = x;
        drawing.design_y = y;
    }
    drawing.rotation = rotation;

    let mut store = MemoryStore::new();
    let service = GeoreferenceService::default();
    service
        .save_drawing(&mut store, &mut drawing, None)
        .with_context(|| format!("failed to ingest {}", dxf.display()))?;

    match (drawing.epsg, drawing.origin) {
        (Some(epsg), Some(origin)) => {
            info!(
                epsg,
                lon = origin.x(),
                lat = origin.y(),
                rotation = drawing.rotation,
                "drawing georeferenced"
            );
        }
        _ => {
            // 未参照是合法终态，进"未参照"清单而不是报错
            warn!("drawing is unreferenced: supply --origin or a DXF with geodata");
        }
    }

    let layers = store.layers_of(drawing.id);
    let mut entity_total = 0usize;
    for layer in &layers {
        let entities = store.entities_of(layer.id);
        entity_total += entities.len();
        info!(
            layer = %layer.name,
            color = %layer.color,
            is_block = layer.is_block,
            entities = entities.len(),
            "layer extracted"
        );
    }
    info!(layers = layers.len(), entities = entity_total, "extraction summary");

    if let Some(path) = csv {
        let file = File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        write_csv(&store, &drawing, file)?;
        info!("feature table written to {}", path.display());
    }
    if let Some(path) = geojson {
        let collection = feature_collection(&store, &drawing);
        let file = File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &collection)?;
        info!("GeoJSON written to {}", path.display());
    }
    Ok(())
}

fn print_info(dxf: PathBuf) -> Result<()> {
    let document = CadDocument::load(&dxf)
        .with_context(|| format!("cannot read {}", dxf.display()))?;
    match document.geodata() {
        Some(geodata) => match geodata.crs() {
            Ok((epsg, xy)) => {
                println!(
                    "geodata: EPSG {epsg} (xy order: {xy}), reference ({:.2}, {:.2}), rotation {:.2}°",
                    geodata.reference_point.0,
                    geodata.reference_point.1,
                    geodata.rotation_degrees()
                );
            }
            Err(err) => println!("geodata: present but invalid ({err})"),
        },
        None => println!("geodata: none"),
    }
    for layer in document.layers() {
        println!("layer {:<20} color index {}", layer.name, layer.color_index);
    }
    let inserts = document.inserts();
    println!("{} block reference(s)", inserts.len());
    Ok(())
}

fn profile(dxf: PathBuf, csv: Option<PathBuf>) -> Result<()> {
    let document = CadDocument::load(&dxf)
        .with_context(|| format!("cannot read {}", dxf.display()))?;
    match csv {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            write_polyline_profile_csv(&document, file)?;
            info!("profile written to {}", path.display());
        }
        None => {
            write_polyline_profile_csv(&document, std::io::stdout())?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // 初始化日志
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(Level::INFO).finish(),
    )?;

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest {
            dxf,
            title,
            origin,
            design,
            rotation,
            csv,
            geojson,
        } => ingest(dxf, title, origin, design, rotation, csv, geojson),
        Command::Info { dxf } => print_info(dxf),
        Command::Profile { dxf, csv } => profile(dxf, csv),
    }
}
