use std::fmt;
use std::str::FromStr;

use palette::{FromColor, IntoColor, Lab, Lch, LinSrgb, Srgb};
use serde::{Deserialize, Serialize};

/// An opaque sRGB color.
///
/// Serializes as `"#RRGGBB"`. Deserializes from `"#RRGGBB"`, `"RRGGBB"`,
/// `"#RGB"` or a `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ColorRepr", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Hex(String),
    Rgb([u8; 3]),
}

impl TryFrom<ColorRepr> for Color {
    type Error = String;

    fn try_from(repr: ColorRepr) -> Result<Self, Self::Error> {
        match repr {
            ColorRepr::Hex(s) => s.parse(),
            ColorRepr::Rgb([r, g, b]) => Ok(Color::new(r, g, b)),
        }
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        c.hex()
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Color {
        Color::new(r, g, b)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_owned(),
            _ => return Err(format!("'{}' is not a #RRGGBB or #RGB color", s)),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| format!("'{}' contains non-hex digits", s))
        };
        Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    pub fn hex(&self) -> String {
        self.to_string()
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    fn srgb(&self) -> Srgb<f32> {
        Srgb::new(self.r, self.g, self.b).into_format::<f32>()
    }

    pub fn to_lab(&self) -> Lab {
        self.srgb().into_color()
    }

    pub fn to_lch(&self) -> Lch {
        self.srgb().into_color()
    }

    /// Nearest displayable color; out-of-gamut values are clamped.
    pub fn from_lab(lab: Lab) -> Color {
        let rgb: Srgb<f32> = Srgb::from_color(lab);
        let rgb: Srgb<u8> = rgb.into_format();
        Color::new(rgb.red, rgb.green, rgb.blue)
    }

    pub fn from_lch(lch: Lch) -> Color {
        Color::from_lab(Lab::from_color(lch))
    }

    /// CIELAB lightness, 0 (black) to 100 (white).
    pub fn lightness(&self) -> f32 {
        self.to_lab().l
    }

    pub fn chroma(&self) -> f32 {
        self.to_lch().chroma
    }

    /// Hue angle in degrees, normalized to [0, 360).
    pub fn hue_degrees(&self) -> f32 {
        self.to_lch().hue.into_positive_degrees()
    }

    /// CIE76 color difference.
    pub fn delta_e(&self, other: &Color) -> f32 {
        lab_distance(&self.to_lab(), &other.to_lab())
    }

    /// WCAG 2.1 relative luminance.
    pub fn relative_luminance(&self) -> f32 {
        let lin: LinSrgb = self.srgb().into_linear();
        0.2126 * lin.red + 0.7152 * lin.green + 0.0722 * lin.blue
    }

    /// WCAG 2.1 contrast ratio, from 1.0 (identical) to 21.0 (black on white).
    pub fn contrast_ratio(&self, other: &Color) -> f32 {
        let a = self.relative_luminance();
        let b = other.relative_luminance();
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        (hi + 0.05) / (lo + 0.05)
    }
}

pub fn lab_distance(a: &Lab, b: &Lab) -> f32 {
    ((a.l - b.l).powi(2) + (a.a - b.a).powi(2) + (a.b - b.b).powi(2)).sqrt()
}

/// Smallest angle between two hues, in degrees.
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}
