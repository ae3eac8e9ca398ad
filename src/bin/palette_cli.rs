use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use focal_palette::assign::Layers;
use focal_palette::config::{Config, ConfigOverrides};
use focal_palette::{logging, segmentation, ColorAssigner, PaletteService, RoleAssigner};

/// Extract foreground palettes from image files without starting the server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Layers JSON (map or list form); when given, each palette is also
    /// assigned to these layers
    #[arg(short, long)]
    layers: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logger(args.verbose, false);

    let config = Config::load(&args.overrides).context("loading configuration")?;
    let segmenter = segmentation::from_config(&config).context("loading segmentation model")?;
    let assigner = Arc::new(RoleAssigner);
    let service = PaletteService::new(config, segmenter, assigner.clone());

    let layers: Option<Layers> = match &args.layers {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Some(serde_json::from_str(&text).with_context(|| format!("parsing layers in {}", path.display()))?)
        }
        None => None,
    };

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let response = service
            .process_image(&bytes)
            .with_context(|| format!("palette extraction failed for {}", input.display()))?;

        let mut out = json!({
            "input": input.display().to_string(),
            "color_palette": response.color_palette,
        });
        if let Some(layers) = &layers {
            let palette: Vec<_> = response.color_palette.colors.iter().map(|e| e.color()).collect();
            let assignment = assigner
                .assign(&palette, layers)
                .with_context(|| format!("color assignment failed for {}", input.display()))?;
            out["assignment"] = serde_json::to_value(&assignment)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}
