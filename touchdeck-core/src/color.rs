//! Colors: hex parsing, Oklab/Oklch conversion and the helpers widgets use
//! to derive their palettes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color {0:?}: expected 3, 4, 6 or 8 hex digits")]
pub struct ColorParseError(pub String);

/// Non-premultiplied sRGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Rgba = Rgba::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`; the `#` is optional.
    pub fn parse(text: &str) -> Result<Self, ColorParseError> {
        let hex = text.strip_prefix('#').unwrap_or(text);
        let err = || ColorParseError(text.to_string());
        if !hex.is_ascii() {
            return Err(err());
        }
        let nibble = |i: usize| -> Result<f32, ColorParseError> {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v as f32 / 15.0)
                .map_err(|_| err())
        };
        let byte = |i: usize| -> Result<f32, ColorParseError> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| err())
        };
        match hex.len() {
            3 => Ok(Rgba::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            4 => Ok(Rgba::rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Ok(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Rgba::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(err()),
        }
    }

    /// Multiply the color channels, keeping alpha.
    pub fn scale(self, factor: f32) -> Self {
        Rgba::rgba(self.r * factor, self.g * factor, self.b * factor, self.a)
    }

    /// Multiply alpha.
    pub fn alpha(self, factor: f32) -> Self {
        Rgba::rgba(self.r, self.g, self.b, self.a * factor)
    }

    /// Apply a display gamma curve to the color channels.
    pub fn gamma(self, gamma: f32) -> Self {
        if (gamma - 1.0).abs() < f32::EPSILON {
            return self;
        }
        let g = |c: f32| c.clamp(0.0, 1.0).powf(gamma);
        Rgba::rgba(g(self.r), g(self.g), g(self.b), self.a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_oklab(self) -> Lab {
        let lin = |c: f32| {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        let (r, g, b) = (lin(self.r), lin(self.g), lin(self.b));
        let l = (0.412_221_47 * r + 0.536_332_55 * g + 0.051_445_995 * b).cbrt();
        let m = (0.211_903_5 * r + 0.680_699_5 * g + 0.107_396_96 * b).cbrt();
        let s = (0.088_302_46 * r + 0.281_718_85 * g + 0.629_978_7 * b).cbrt();
        Lab {
            l: 0.210_454_26 * l + 0.793_617_8 * m - 0.004_072_047 * s,
            a: 1.977_998_5 * l - 2.428_592_2 * m + 0.450_593_7 * s,
            b: 0.025_904_037 * l + 0.782_771_77 * m - 0.808_675_77 * s,
        }
    }
}

impl FromStr for Rgba {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgba::parse(s)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        write!(f, "#{:02x}{:02x}{:02x}", q(self.r), q(self.g), q(self.b))?;
        if self.a < 1.0 {
            write!(f, "{:02x}", q(self.a))?;
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════
// Oklab / Oklch
// ════════════════════════════════════════════════════════════════════

/// A color in the Oklab space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Lab {
    /// Lightness, chroma and hue in degrees.
    pub fn from_lch(l: f32, c: f32, h: f32) -> Self {
        let rad = h.to_radians();
        Lab {
            l,
            a: c * rad.cos(),
            b: c * rad.sin(),
        }
    }

    pub fn lerp(self, other: Lab, t: f32) -> Lab {
        Lab {
            l: self.l + (other.l - self.l) * t,
            a: self.a + (other.a - self.a) * t,
            b: self.b + (other.b - self.b) * t,
        }
    }

    /// Convert to sRGB, clipping out-of-gamut channels.
    pub fn to_rgba(self) -> Rgba {
        let l = (self.l + 0.396_337_78 * self.a + 0.215_803_76 * self.b).powi(3);
        let m = (self.l - 0.105_561_346 * self.a - 0.063_854_17 * self.b).powi(3);
        let s = (self.l - 0.089_484_18 * self.a - 1.291_485_5 * self.b).powi(3);
        let r = 4.076_741_7 * l - 3.307_711_6 * m + 0.230_969_94 * s;
        let g = -1.268_438 * l + 2.609_757_4 * m - 0.341_319_38 * s;
        let b = -0.004_196_086_3 * l - 0.703_418_6 * m + 1.707_614_7 * s;
        let enc = |c: f32| {
            let c = c.clamp(0.0, 1.0);
            if c <= 0.003_130_8 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        };
        Rgba::rgb(enc(r), enc(g), enc(b))
    }
}

pub fn oklch(l: f32, c: f32, h: f32) -> Rgba {
    Lab::from_lch(l, c, h).to_rgba()
}

pub fn lerp(a: Rgba, b: Rgba, t: f32) -> Rgba {
    Rgba::rgba(
        a.r + (b.r - a.r) * t,
        a.g + (b.g - a.g) * t,
        a.b + (b.b - a.b) * t,
        a.a + (b.a - a.a) * t,
    )
}

/// Parse a color literal that is known to be valid at compile time.
/// Falls back to magenta so a typo is visible on screen rather than fatal.
pub fn hex(text: &str) -> Rgba {
    Rgba::parse(text).unwrap_or_else(|e| {
        tracing::error!("{}", e);
        Rgba::rgb(1.0, 0.0, 1.0)
    })
}
