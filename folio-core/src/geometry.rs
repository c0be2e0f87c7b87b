//! Normalized page geometry, rotation and colors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rectangle in page-relative coordinates, each edge in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl NormalizedRect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn clamp(self) -> Self {
        let left = self.left.clamp(0.0, 1.0);
        let right = self.right.clamp(0.0, 1.0);
        let top = self.top.clamp(0.0, 1.0);
        let bottom = self.bottom.clamp(0.0, 1.0);
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn is_null(&self) -> bool {
        self.width() <= 0.0 && self.height() <= 0.0
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn union(&self, other: &NormalizedRect) -> NormalizedRect {
        NormalizedRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// True when both rects share some vertical extent, i.e. sit on one text line.
    pub fn same_line(&self, other: &NormalizedRect) -> bool {
        self.top < other.bottom && other.top < self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Rotation0),
            90 => Some(Rotation::Rotation90),
            180 => Some(Rotation::Rotation180),
            270 => Some(Rotation::Rotation270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Rotation0 => 0,
            Rotation::Rotation90 => 90,
            Rotation::Rotation180 => 180,
            Rotation::Rotation270 => 270,
        }
    }

    /// Width and height swap for quarter turns.
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Rotation90 | Rotation::Rotation270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::YELLOW
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid color {0:?}, expected #rrggbb")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.is_ascii())
            .ok_or_else(|| ParseColorError(s.to_owned()))?;
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ParseColorError(s.to_owned()))
        };
        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_orders_and_bounds_edges() {
        let rect = NormalizedRect::new(1.2, 0.8, -0.1, 0.2).clamp();
        assert_eq!(rect, NormalizedRect::new(0.0, 0.2, 1.0, 0.8));
        assert!(rect.is_valid());
    }

    #[test]
    fn rotation_accepts_only_quarter_turns() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Rotation270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Rotation90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Rotation90.is_transposed());
        assert!(!Rotation::Rotation180.is_transposed());
    }

    #[test]
    fn color_parses_hex_form() {
        let color: Color = "#ff8000".parse().unwrap();
        assert_eq!(color, Color::rgb(255, 128, 0));
        assert_eq!(color.to_string(), "#ff8000");
        assert!("ff8000".parse::<Color>().is_err());
        assert!("#ff80".parse::<Color>().is_err());
    }
}
