//! Layerforge - render a saved scene to a PNG.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use compositor::ExportSizing;
use editor::{EditorConfig, EditorSession};
use scene::SourceKey;

/// Layerforge - photo compositing from a scene description
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene description (JSON)
    scene: PathBuf,

    /// Directory the PNG is written to [default: ~/Downloads]
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Export at the preview size times this factor
    #[arg(long, conflicts_with_all = ["width", "height"])]
    scale: Option<f32>,

    /// Exact export width
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Exact export height
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Width of the box the scene was composed in
    #[arg(long, default_value = "800")]
    preview_width: u32,

    /// Height of the box the scene was composed in
    #[arg(long, default_value = "600")]
    preview_height: u32,

    /// Font file for a family, as FAMILY:WEIGHT=PATH (repeatable)
    #[arg(long = "font", value_parser = parse_font)]
    fonts: Vec<FontArg>,

    /// Prefix of the exported file name
    #[arg(long, default_value = "layerforge")]
    product: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct FontArg {
    family: String,
    weight: u16,
    path: PathBuf,
}

fn parse_font(value: &str) -> Result<FontArg, String> {
    let (face, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected FAMILY:WEIGHT=PATH, got `{}`", value))?;
    let (family, weight) = match face.rsplit_once(':') {
        Some((family, weight)) => {
            let weight = weight.parse().map_err(|_| format!("invalid font weight `{}`", weight))?;
            (family, weight)
        }
        None => (face, 400),
    };
    if family.is_empty() || path.is_empty() {
        return Err(format!("expected FAMILY:WEIGHT=PATH, got `{}`", value));
    }
    Ok(FontArg {
        family: family.to_string(),
        weight,
        path: PathBuf::from(path),
    })
}

impl Args {
    fn sizing(&self) -> ExportSizing {
        match (self.scale, self.width, self.height) {
            (Some(factor), _, _) => ExportSizing::Scale(factor),
            (None, Some(width), Some(height)) => ExportSizing::Exact { width, height },
            _ => ExportSizing::Native,
        }
    }

    fn config(&self) -> EditorConfig {
        let mut config = EditorConfig::default()
            .with_preview_size(self.preview_width, self.preview_height)
            .with_product_name(&self.product)
            .with_export_sizing(self.sizing());
        if let Some(out) = &self.out {
            config = config.with_downloads_dir(out);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Layerforge v{}", editor::VERSION);

    let json = tokio::fs::read_to_string(&args.scene)
        .await
        .with_context(|| format!("reading {}", args.scene.display()))?;

    let session = EditorSession::new(args.config())?;
    for font in &args.fonts {
        let path = font.path.to_str().ok_or_else(|| anyhow!("font path is not UTF-8: {}", font.path.display()))?;
        session.resources().register_font(&font.family, font.weight, SourceKey::new(path));
    }
    session.load_scene_json(&json)?;

    let path = session.export_to_downloads().await?;
    println!("{}", path.display());
    session.teardown();
    Ok(())
}
