//! Conversion between screen units (points or pixels) and world units (metres).

use crate::core::math::{Size2D, Vector2D};
use crate::error::{Error, Result};

/// Screen units per world unit used when none is given.
pub const DEFAULT_PTM_RATIO: f32 = 32.0;

/// Points-to-metres ratio.
///
/// The solver works best with particles of roughly 0.05–1 world units, so hosts that
/// think in screen points scale everything they pass in by this ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtmRatio(f32);

impl Default for PtmRatio {
    fn default() -> Self {
        Self(DEFAULT_PTM_RATIO)
    }
}

impl PtmRatio {
    /// Errors: `Error::InvalidArgument` unless `ratio` is finite and > 0.
    pub fn new(ratio: f32) -> Result<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(Error::invalid("ptm ratio must be finite and > 0"));
        }
        Ok(Self(ratio))
    }

    pub fn ratio(&self) -> f32 {
        self.0
    }

    pub fn length_to_world(&self, points: f32) -> f32 {
        points / self.0
    }

    pub fn length_to_screen(&self, metres: f32) -> f32 {
        metres * self.0
    }

    pub fn to_world(&self, p: Vector2D) -> Vector2D {
        p * (1.0 / self.0)
    }

    pub fn to_screen(&self, p: Vector2D) -> Vector2D {
        p * self.0
    }

    pub fn size_to_world(&self, s: Size2D) -> Size2D {
        Size2D::new(s.width / self.0, s.height / self.0)
    }

    pub fn size_to_screen(&self, s: Size2D) -> Size2D {
        Size2D::new(s.width * self.0, s.height * self.0)
    }
}
