use palette::Lab;

use crate::colors::color::{lab_distance, Color};
use crate::error::InferenceError;
use crate::imaging::{Mask, ModelInput};
use crate::segmentation::Segmenter;

/// Model-free fallback: assumes the subject sits away from the image edges.
///
/// The mean CIELAB color of a band along the border is the background
/// estimate; each pixel's foreground probability is a logistic function of
/// its distance (ΔE76) to that estimate.
#[derive(Debug, Clone)]
pub struct BorderContrastSegmenter {
    /// Band width as a fraction of the shorter side.
    pub border_fraction: f32,
    /// ΔE at which a pixel is scored 0.5.
    pub midpoint: f32,
    pub steepness: f32,
}

impl Default for BorderContrastSegmenter {
    fn default() -> Self {
        BorderContrastSegmenter { border_fraction: 0.08, midpoint: 20.0, steepness: 0.25 }
    }
}

impl BorderContrastSegmenter {
    fn band(&self, width: u32, height: u32) -> u32 {
        let side = width.min(height) as f32;
        ((side * self.border_fraction).round() as u32).max(1)
    }
}

fn to_lab(rgb: [f32; 3]) -> Lab {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::new(byte(rgb[0]), byte(rgb[1]), byte(rgb[2])).to_lab()
}

impl Segmenter for BorderContrastSegmenter {
    fn name(&self) -> &str {
        "border-contrast"
    }

    fn predict(&self, input: &ModelInput) -> Result<Mask, InferenceError> {
        let expected = input.pixel_count() * 3;
        if input.pixels.len() != expected {
            return Err(InferenceError::InputLength { expected, actual: input.pixels.len() });
        }
        if input.pixel_count() == 0 {
            return Err(InferenceError::Model("input image is empty".into()));
        }

        let (w, h) = (input.width, input.height);
        let band = self.band(w, h);
        let labs: Vec<Lab> = (0..input.pixel_count()).map(|i| to_lab(input.pixel(i))).collect();

        let (mut sum_l, mut sum_a, mut sum_b, mut n) = (0.0f32, 0.0f32, 0.0f32, 0usize);
        for y in 0..h {
            for x in 0..w {
                let on_border = x < band || y < band || x + band >= w || y + band >= h;
                if on_border {
                    let lab = labs[(y * w + x) as usize];
                    sum_l += lab.l;
                    sum_a += lab.a;
                    sum_b += lab.b;
                    n += 1;
                }
            }
        }
        let n = n.max(1) as f32;
        let background = Lab::new(sum_l / n, sum_a / n, sum_b / n);

        let data = labs
            .iter()
            .map(|lab| {
                let d = lab_distance(lab, &background);
                1.0 / (1.0 + (-self.steepness * (d - self.midpoint)).exp())
            })
            .collect();

        Mask::new(w, h, data).map_err(|e| InferenceError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn framed_square(size: u32) -> ModelInput {
        ModelInput::from_rgb(&RgbImage::from_fn(size, size, |x, y| {
            let inner = size / 4..3 * size / 4;
            if inner.contains(&x) && inner.contains(&y) {
                Rgb([200, 20, 20])
            } else {
                Rgb([245, 245, 245])
            }
        }))
    }

    #[test]
    fn center_subject_is_foreground() {
        let seg = BorderContrastSegmenter::default();
        let mask = seg.predict(&framed_square(32)).unwrap();
        assert!(mask.get(16, 16) > 0.95);
        assert!(mask.get(0, 0) < 0.05);
        assert!(mask.get(31, 5) < 0.05);
        assert!((mask.coverage(0.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn uniform_image_has_no_foreground() {
        let seg = BorderContrastSegmenter::default();
        let input = ModelInput::from_rgb(&RgbImage::from_pixel(10, 10, Rgb([80, 90, 100])));
        let mask = seg.predict(&input).unwrap();
        assert_eq!(mask.coverage(0.5), 0.0);
    }

    #[test]
    fn deterministic() {
        let seg = BorderContrastSegmenter::default();
        let input = framed_square(24);
        assert_eq!(seg.predict(&input).unwrap(), seg.predict(&input).unwrap());
    }

    #[test]
    fn tiny_images_still_have_a_band() {
        let seg = BorderContrastSegmenter::default();
        assert_eq!(seg.band(3, 3), 1);
        let input = ModelInput::from_rgb(&RgbImage::from_pixel(1, 1, Rgb([1, 2, 3])));
        assert_eq!(seg.predict(&input).unwrap().data.len(), 1);
    }
}
