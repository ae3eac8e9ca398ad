/// focal-palette HTTP server
///
/// Run with:
///   cargo run --bin palette-server --release -- --port 5000
///
/// Routes:
///   POST /process_image  raw image bytes -> {"color_palette": [...]}
///   POST /assign_colors  {"layers", "palette"} -> layer colors
///   GET  /health
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tiny_http::Server;

use focal_palette::config::{Config, ConfigOverrides};
use focal_palette::{http, logging, segmentation, PaletteService, RoleAssigner};

#[derive(Debug, Parser)]
#[command(name = "palette-server", version, about = "Serve foreground palettes over HTTP")]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    /// Emit logs as JSON lines
    #[arg(long, env = "FOCAL_PALETTE_LOG_JSON")]
    log_json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose, cli.log_json);

    let config = Config::load(&cli.overrides).context("loading configuration")?;
    let segmenter = segmentation::from_config(&config).context("loading segmentation model")?;

    let addr = config.addr();
    let server = Server::http(&addr).map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;

    tracing::info!(
        addr = %addr,
        model = segmenter.name(),
        image_size = config.image_size,
        n_colors = config.n_colors,
        n_new_colors = config.n_new_colors,
        timeout_secs = config.request_timeout_secs,
        "palette server listening"
    );

    let service = Arc::new(PaletteService::new(config, segmenter, Arc::new(RoleAssigner)));
    http::serve(server, service);
    Ok(())
}
