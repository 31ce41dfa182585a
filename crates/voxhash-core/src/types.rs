//! Core color type.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// RGBA8 color packed as `r << 24 | g << 16 | b << 8 | a`.
///
/// This is the layout the consumer decodes from the color table.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PackedColor(pub u32);

impl PackedColor {
    /// Opaque white
    pub const WHITE: Self = Self::from_rgba8(255, 255, 255, 255);

    /// Pack four 8-bit channels
    #[inline]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32)
    }

    /// Pack a linear RGB color in [0, 1] with full alpha
    #[inline]
    pub fn from_vec3(color: Vec3) -> Self {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::from_rgba8(quantize(color.x), quantize(color.y), quantize(color.z), 255)
    }

    /// Unpack the RGB channels to [0, 1]
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        let [r, g, b, _] = self.to_rgba8();
        Vec3::new(f32::from(r), f32::from(g), f32::from(b)) / 255.0
    }

    /// Split into `[r, g, b, a]`
    #[inline]
    pub const fn to_rgba8(self) -> [u8; 4] {
        [
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn channel_layout() {
        let c = PackedColor::from_rgba8(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.0, 0x1122_3344);
        assert_eq!(c.to_rgba8(), [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn vec3_conversion_saturates() {
        let c = PackedColor::from_vec3(Vec3::new(2.0, -1.0, 0.5));
        assert_eq!(c.to_rgba8(), [255, 0, 128, 255]);
        assert_relative_eq!(c.to_vec3().z, 128.0 / 255.0);
    }
}
