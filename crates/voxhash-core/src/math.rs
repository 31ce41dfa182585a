//! Bounding boxes and grid resolution.

use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned bounding box of a point cloud, in double precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl Bounds {
    /// Create bounds from min and max corners
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Tight bounds around a set of points, `None` if there are no finite points
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        points
            .iter()
            .filter(|p| p.is_finite())
            .fold(None, |acc: Option<Self>, p| {
                let p = p.as_dvec3();
                Some(match acc {
                    Some(b) => Self::new(b.min.min(p), b.max.max(p)),
                    None => Self::new(p, p),
                })
            })
    }

    /// Size along each axis
    #[inline]
    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }

    /// Check the box is finite and non-empty on every axis
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::InvalidBounds(format!(
                "non-finite corners {} .. {}",
                self.min, self.max
            )));
        }
        if self.min.cmpge(self.max).any() {
            return Err(Error::InvalidBounds(format!(
                "min {} is not below max {} on every axis",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Fine voxel edge length so that the longest axis spans
    /// `fine_voxels_per_axis` voxels.
    pub fn grid_delta(&self, fine_voxels_per_axis: u32) -> Result<f64> {
        self.validate()?;
        if fine_voxels_per_axis == 0 {
            return Err(Error::InvalidResolution(fine_voxels_per_axis));
        }
        Ok(self.extent().max_element() / f64::from(fine_voxels_per_axis))
    }}
