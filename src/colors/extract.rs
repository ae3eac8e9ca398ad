/// Extended palette extraction.
///
/// Base colors come from k-means in CIELAB over the focal object's opaque
/// pixels; derived colors are hue rotations (or lightness shifts for
/// near-neutrals) of the base colors in CIELCh.
use std::collections::BTreeMap;

use kmeans_colors::{get_kmeans, Sort};
use palette::{Lab, Lch};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::colors::color::Color;
use crate::error::PaletteError;
use crate::imaging::FocalObject;

const MAX_ITER: usize = 20;
const CONVERGE: f32 = 1e-4;

/// Below this CIELCh chroma a hue rotation is visually meaningless.
const NEUTRAL_CHROMA: f32 = 10.0;

/// Complementary, split-complementary, analogous, then triadic.
const HUE_ROTATIONS: [f32; 7] = [180.0, 150.0, 210.0, 30.0, 330.0, 120.0, 240.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteOptions {
    pub n_colors: usize,
    pub n_new_colors: usize,
    pub seed: u64,
}

impl Default for PaletteOptions {
    fn default() -> Self {
        PaletteOptions { n_colors: 5, n_new_colors: 3, seed: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Base,
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub hex: String,
    pub rgb: [u8; 3],
    /// Share of focal pixels in this cluster; 0 for synthesized entries.
    pub proportion: f32,
    pub kind: EntryKind,
}

impl PaletteEntry {
    fn new(color: Color, proportion: f32, kind: EntryKind) -> Self {
        PaletteEntry { hex: color.hex(), rgb: color.rgb(), proportion, kind }
    }

    pub fn color(&self) -> Color {
        Color::from(self.rgb)
    }
}

/// `n_colors` base entries (most prominent first) followed by
/// `n_new_colors` derived entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedPalette {
    pub colors: Vec<PaletteEntry>,
}

impl ExtendedPalette {
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn base(&self) -> impl Iterator<Item = &PaletteEntry> {
        self.colors.iter().filter(|e| e.kind == EntryKind::Base)
    }

    pub fn derived(&self) -> impl Iterator<Item = &PaletteEntry> {
        self.colors.iter().filter(|e| e.kind == EntryKind::Derived)
    }
}

pub fn extended_palette(focal: &FocalObject, opts: &PaletteOptions) -> Result<ExtendedPalette, PaletteError> {
    if opts.n_colors == 0 {
        return Err(PaletteError::ZeroColors);
    }

    let mut pixels: Vec<[u8; 3]> = focal.opaque_pixels().collect();
    if pixels.is_empty() {
        warn!("mask removed every pixel; extracting palette from the whole image");
        pixels = focal.all_pixels().collect();
    }
    if pixels.is_empty() {
        return Err(PaletteError::NoPixels);
    }

    let mut base = base_colors(&pixels, opts);
    pad_base(&mut base, opts.n_colors);

    let mut colors: Vec<PaletteEntry> = base
        .iter()
        .map(|&(color, share)| PaletteEntry::new(color, share, EntryKind::Base))
        .collect();
    for i in 0..opts.n_new_colors {
        let (source, _) = base[i % base.len()];
        colors.push(PaletteEntry::new(derive(source, i), 0.0, EntryKind::Derived));
    }

    debug!(
        pixels = pixels.len(),
        base = opts.n_colors,
        derived = opts.n_new_colors,
        "extracted extended palette"
    );
    Ok(ExtendedPalette { colors })
}

/// Most prominent colors with their pixel share, descending.
fn base_colors(pixels: &[[u8; 3]], opts: &PaletteOptions) -> Vec<(Color, f32)> {
    let mut histogram: BTreeMap<[u8; 3], usize> = BTreeMap::new();
    for p in pixels {
        *histogram.entry(*p).or_default() += 1;
    }
    let total = pixels.len() as f32;

    if histogram.len() <= opts.n_colors {
        let mut exact: Vec<(Color, f32)> = histogram
            .into_iter()
            .map(|(rgb, count)| (Color::from(rgb), count as f32 / total))
            .collect();
        exact.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        return exact;
    }

    let lab: Vec<Lab> = pixels.iter().map(|&p| Color::from(p).to_lab()).collect();
    let result = get_kmeans(opts.n_colors, MAX_ITER, CONVERGE, false, &lab, opts.seed);
    let mut clusters = Lab::sort_indexed_colors(&result.centroids, &result.indices);
    clusters.sort_by(|a, b| {
        b.percentage
            .total_cmp(&a.percentage)
            .then(b.centroid.l.total_cmp(&a.centroid.l))
    });
    clusters
        .into_iter()
        .map(|c| (Color::from_lab(c.centroid), c.percentage))
        .collect()
}

/// Fills missing base slots with lightness variants of the dominant color,
/// alternating lighter and darker.
fn pad_base(base: &mut Vec<(Color, f32)>, n_colors: usize) {
    let Some(&(dominant, _)) = base.first() else { return };
    let lch = dominant.to_lch();
    let mut step = 1;
    while base.len() < n_colors {
        let magnitude = 15.0 * ((step + 1) / 2) as f32;
        let delta = if step % 2 == 1 { magnitude } else { -magnitude };
        let l = (lch.l + delta).clamp(0.0, 100.0);
        base.push((Color::from_lch(Lch::new(l, lch.chroma, lch.hue)), 0.0));
        step += 1;
    }
}

fn derive(source: Color, i: usize) -> Color {
    let lch = source.to_lch();
    if lch.chroma >= NEUTRAL_CHROMA {
        let hue = lch.hue.into_degrees() + HUE_ROTATIONS[i % HUE_ROTATIONS.len()];
        Color::from_lch(Lch::new(lch.l, lch.chroma, hue))
    } else {
        let delta = if lch.l >= 50.0 { -25.0 } else { 25.0 };
        Color::from_lch(Lch::new(lch.l + delta, lch.chroma, lch.hue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::collections::BTreeSet;

    fn focal_from_fn(size: u32, f: impl Fn(u32, u32) -> Rgba<u8>) -> FocalObject {
        FocalObject { image: RgbaImage::from_fn(size, size, f) }
    }

    fn opts(n_colors: usize, n_new_colors: usize) -> PaletteOptions {
        PaletteOptions { n_colors, n_new_colors, seed: 0 }
    }

    /// Four vertical stripes of distinct hues, plus a noisy gradient so that
    /// k-means has more than `n_colors` distinct inputs.
    fn stripes() -> FocalObject {
        focal_from_fn(32, |x, y| {
            let jitter = ((x * 7 + y * 13) % 5) as u8;
            match x / 8 {
                0 => Rgba([220 + jitter, 20, 20, 255]),
                1 => Rgba([20, 200 + jitter, 40, 255]),
                2 => Rgba([30, 40, 210 + jitter, 255]),
                _ => Rgba([240, 220 + jitter, 30, 255]),
            }
        })
    }

    #[test]
    fn length_is_base_plus_derived() {
        let palette = extended_palette(&stripes(), &opts(5, 3)).unwrap();
        assert_eq!(palette.len(), 8);
        assert_eq!(palette.base().count(), 5);
        assert_eq!(palette.derived().count(), 3);
        let total: f32 = palette.base().map(|e| e.proportion).sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn base_is_sorted_by_prominence() {
        let palette = extended_palette(&stripes(), &opts(4, 0)).unwrap();
        let shares: Vec<f32> = palette.base().map(|e| e.proportion).collect();
        assert!(shares.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn deterministic_for_same_input() {
        let a = extended_palette(&stripes(), &opts(5, 3)).unwrap();
        let b = extended_palette(&stripes(), &opts(5, 3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn only_opaque_pixels_count() {
        let focal = focal_from_fn(10, |x, _| {
            if x < 3 { Rgba([0, 0, 255, 255]) } else { Rgba([255, 0, 0, 0]) }
        });
        let palette = extended_palette(&focal, &opts(1, 0)).unwrap();
        assert_eq!(palette.colors[0].hex, "#0000FF");
        assert_eq!(palette.colors[0].proportion, 1.0);
    }

    #[test]
    fn empty_mask_falls_back_to_whole_image() {
        let focal = focal_from_fn(6, |_, _| Rgba([10, 120, 60, 0]));
        let palette = extended_palette(&focal, &opts(2, 1)).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.colors[0].rgb, [10, 120, 60]);
    }

    #[test]
    fn exactly_n_distinct_colors_are_kept_verbatim() {
        let focal = focal_from_fn(4, |x, _| match x {
            0 => Rgba([255, 0, 0, 255]),
            1 => Rgba([0, 255, 0, 255]),
            2 => Rgba([0, 0, 255, 255]),
            _ => Rgba([9, 9, 9, 255]),
        });
        let palette = extended_palette(&focal, &opts(4, 0)).unwrap();
        let hexes: BTreeSet<&str> = palette.base().map(|e| e.hex.as_str()).collect();
        let expected: BTreeSet<&str> = ["#FF0000", "#00FF00", "#0000FF", "#090909"].into_iter().collect();
        assert_eq!(hexes, expected);
        assert!(palette.base().all(|e| (e.proportion - 0.25).abs() < 1e-6));
    }

    #[test]
    fn solid_color_is_padded_with_variants() {
        let focal = focal_from_fn(4, |_, _| Rgba([128, 64, 32, 255]));
        let palette = extended_palette(&focal, &opts(5, 3)).unwrap();
        assert_eq!(palette.len(), 8);
        assert_eq!(palette.colors[0].rgb, [128, 64, 32]);
        assert_eq!(palette.colors[0].proportion, 1.0);
        assert!(palette.base().skip(1).all(|e| e.proportion == 0.0));
        assert!(palette.colors[1].color().lightness() > palette.colors[0].color().lightness());
        assert!(palette.colors[2].color().lightness() < palette.colors[0].color().lightness());
    }

    #[test]
    fn derived_colors_rotate_hue_of_chromatic_sources() {
        let focal = focal_from_fn(4, |_, _| Rgba([200, 30, 30, 255]));
        let palette = extended_palette(&focal, &opts(1, 1)).unwrap();
        let source = palette.colors[0].color();
        let derived = palette.colors[1].color();
        let diff = crate::colors::color::hue_distance(source.hue_degrees(), derived.hue_degrees());
        assert!(diff > 90.0, "complement should sit far around the wheel, got {}", diff);
    }

    #[test]
    fn derived_colors_shift_lightness_of_neutrals() {
        let focal = focal_from_fn(4, |_, _| Rgba([240, 240, 240, 255]));
        let palette = extended_palette(&focal, &opts(1, 1)).unwrap();
        let l0 = palette.colors[0].color().lightness();
        let l1 = palette.colors[1].color().lightness();
        assert!(l0 - l1 > 20.0);
    }

    #[test]
    fn rejects_zero_colors() {
        assert!(matches!(extended_palette(&stripes(), &opts(0, 3)), Err(PaletteError::ZeroColors)));
    }

    #[test]
    fn serializes_as_plain_array() {
        let palette = extended_palette(&stripes(), &opts(2, 1)).unwrap();
        let value = serde_json::to_value(&palette).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[2]["kind"], "derived");
        assert!(arr[0]["hex"].as_str().unwrap().starts_with('#'));
    }
}
