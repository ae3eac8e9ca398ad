use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::colors::PaletteOptions;
use crate::error::ConfigError;

/// Service configuration. Every field has a default, so a partial TOML file
/// (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// JSON network for `NetworkSegmenter`; the border-contrast fallback is
    /// used when unset.
    pub model_path: Option<PathBuf>,
    pub image_size: u32,
    pub n_colors: usize,
    pub n_new_colors: usize,
    pub mask_threshold: f32,
    pub kmeans_seed: u64,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    /// Pipeline workers alive at once, including timed-out ones still running.
    pub max_workers: usize,
    pub expose_error_details: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 5000,
            model_path: None,
            image_size: 256,
            n_colors: 5,
            n_new_colors: 3,
            mask_threshold: 0.5,
            kmeans_seed: 0,
            request_timeout_secs: 30,
            max_body_bytes: 20 * 1024 * 1024,
            max_workers: 64,
            expose_error_details: true,
        }
    }
}

/// Command-line / environment overrides, applied on top of the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// TOML file with any subset of the config keys
    #[arg(long, env = "FOCAL_PALETTE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "FOCAL_PALETTE_HOST")]
    pub host: Option<String>,

    #[arg(short, long, env = "FOCAL_PALETTE_PORT")]
    pub port: Option<u16>,

    /// Segmentation network in JSON form
    #[arg(short, long, env = "FOCAL_PALETTE_MODEL")]
    pub model: Option<PathBuf>,

    /// Side length images are resized to before segmentation
    #[arg(long, env = "FOCAL_PALETTE_IMAGE_SIZE")]
    pub image_size: Option<u32>,

    /// Number of base colors extracted by k-means
    #[arg(short = 'k', long, env = "FOCAL_PALETTE_N_COLORS")]
    pub n_colors: Option<usize>,

    /// Number of derived colors appended to the base colors
    #[arg(long, env = "FOCAL_PALETTE_N_NEW_COLORS")]
    pub n_new_colors: Option<usize>,

    /// Mask values at or above this keep a pixel
    #[arg(long, env = "FOCAL_PALETTE_MASK_THRESHOLD")]
    pub mask_threshold: Option<f32>,

    #[arg(long, env = "FOCAL_PALETTE_KMEANS_SEED")]
    pub kmeans_seed: Option<u64>,

    #[arg(long, env = "FOCAL_PALETTE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "FOCAL_PALETTE_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    #[arg(long, env = "FOCAL_PALETTE_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Replace 5xx error text with a generic message
    #[arg(long, env = "FOCAL_PALETTE_HIDE_ERROR_DETAILS")]
    pub hide_error_details: bool,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Config::from_toml_str(&text)
    }

    /// Defaults, then the optional TOML file, then CLI/env overrides.
    pub fn load(overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
        let mut config = match &overrides.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, o: &ConfigOverrides) {
        if let Some(v) = &o.host { self.host = v.clone(); }
        if let Some(v) = o.port { self.port = v; }
        if let Some(v) = &o.model { self.model_path = Some(v.clone()); }
        if let Some(v) = o.image_size { self.image_size = v; }
        if let Some(v) = o.n_colors { self.n_colors = v; }
        if let Some(v) = o.n_new_colors { self.n_new_colors = v; }
        if let Some(v) = o.mask_threshold { self.mask_threshold = v; }
        if let Some(v) = o.kmeans_seed { self.kmeans_seed = v; }
        if let Some(v) = o.request_timeout_secs { self.request_timeout_secs = v; }
        if let Some(v) = o.max_body_bytes { self.max_body_bytes = v; }
        if let Some(v) = o.max_workers { self.max_workers = v; }
        if o.hide_error_details { self.expose_error_details = false; }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if !(8..=2048).contains(&self.image_size) {
            return invalid(format!("image_size must be within 8..=2048, got {}", self.image_size));
        }
        if !(1..=64).contains(&self.n_colors) {
            return invalid(format!("n_colors must be within 1..=64, got {}", self.n_colors));
        }
        if self.n_new_colors > 64 {
            return invalid(format!("n_new_colors must be at most 64, got {}", self.n_new_colors));
        }
        if !(0.0..=1.0).contains(&self.mask_threshold) {
            return invalid(format!("mask_threshold must be within [0, 1], got {}", self.mask_threshold));
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be positive".into());
        }
        if self.max_body_bytes == 0 {
            return invalid("max_body_bytes must be positive".into());
        }
        if self.max_workers == 0 {
            return invalid("max_workers must be positive".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn palette_options(&self) -> PaletteOptions {
        PaletteOptions {
            n_colors: self.n_colors,
            n_new_colors: self.n_new_colors,
            seed: self.kmeans_seed,
        }
    }
}
