/// Image plumbing around the segmentation model.
///
/// Decoding, resizing to the working resolution, normalizing pixels for the
/// model, and applying the predicted mask to isolate the focal object.
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage, Rgba, RgbaImage};

use crate::error::MaskError;

/// Decodes any format the `image` crate was built with (PNG/JPEG/BMP/GIF).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Resizes to `size × size` (aspect ratio is not preserved) and drops alpha.
pub fn working_image(image: &DynamicImage, size: u32) -> RgbImage {
    image.resize_exact(size, size, FilterType::Triangle).to_rgb8()
}

/// Normalized RGB input for a segmentation model.
///
/// `pixels` is row-major, three values per pixel, each in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl ModelInput {
    pub fn from_rgb(image: &RgbImage) -> ModelInput {
        ModelInput {
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().flat_map(|p| p.0.iter().map(|&c| c as f32 / 255.0)).collect(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGB triple at pixel index `i` (row-major).
    pub fn pixel(&self, i: usize) -> [f32; 3] {
        [self.pixels[3 * i], self.pixels[3 * i + 1], self.pixels[3 * i + 2]]
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b] = self.pixel((y * self.width + x) as usize);
            image::Rgb([to_byte(r), to_byte(g), to_byte(b)])
        })
    }

    /// Resamples to `size × size`. Returns a clone when already that size.
    pub fn resized(&self, size: u32) -> ModelInput {
        if self.width == size && self.height == size {
            return self.clone();
        }
        let small = image::imageops::resize(&self.to_rgb_image(), size, size, FilterType::Triangle);
        ModelInput::from_rgb(&small)
    }
}

/// Decodes-side entry point: resize a decoded image and normalize it for the
/// model in one step.
pub fn preprocess_image(image: &DynamicImage, size: u32) -> ModelInput {
    ModelInput::from_rgb(&working_image(image, size))
}

/// Per-pixel foreground probability in [0, 1], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Mask {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Mask, MaskError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(MaskError::BufferLength { expected, actual: data.len() });
        }
        Ok(Mask { width, height, data })
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Bilinear resize through an 8-bit buffer; precision beyond 1/255 does
    /// not survive, which is below any sensible threshold granularity.
    pub fn resize(&self, width: u32, height: u32) -> Mask {
        if self.width == width && self.height == height {
            return self.clone();
        }
        let gray = GrayImage::from_fn(self.width, self.height, |x, y| Luma([to_byte(self.get(x, y))]));
        let scaled = image::imageops::resize(&gray, width, height, FilterType::Triangle);
        Mask {
            width,
            height,
            data: scaled.pixels().map(|p| p.0[0] as f32 / 255.0).collect(),
        }
    }

    /// Share of pixels at or above `threshold`.
    pub fn coverage(&self, threshold: f32) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let kept = self.data.iter().filter(|&&v| v >= threshold).count();
        kept as f32 / self.data.len() as f32
    }
}

/// The working image with background pixels made fully transparent.
#[derive(Debug, Clone)]
pub struct FocalObject {
    pub image: RgbaImage,
}

impl FocalObject {
    /// Colors of the pixels the mask kept.
    pub fn opaque_pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.image.pixels().filter(|p| p.0[3] > 0).map(|p| [p.0[0], p.0[1], p.0[2]])
    }

    /// Original colors of every pixel, masked or not.
    pub fn all_pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.image.pixels().map(|p| [p.0[0], p.0[1], p.0[2]])
    }
}

/// Keeps pixels whose mask value is `>= threshold`.
///
/// Suppressed pixels keep their RGB (so a caller can still fall back to the
/// whole image) but get alpha 0.
pub fn apply_mask(image: &RgbImage, mask: &Mask, threshold: f32) -> Result<FocalObject, MaskError> {
    if image.width() != mask.width || image.height() != mask.height {
        return Err(MaskError::SizeMismatch {
            mask_width: mask.width,
            mask_height: mask.height,
            image_width: image.width(),
            image_height: image.height(),
        });
    }
    let focal = RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let alpha = if mask.get(x, y) >= threshold { 255 } else { 0 };
        Rgba([r, g, b, alpha])
    });
    Ok(FocalObject { image: focal })
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
