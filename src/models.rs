//! Geometric model container.
//!
//! All supported two-view geometries (homography, fundamental matrix,
//! essential matrix) share the same 3x3 parameter block, so a single tagged
//! container is enough for the whole pipeline; the tag is what residual and
//! validity checks dispatch on at the API boundary.

use nalgebra::Matrix3;

/// Geometry described by a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Homography,
    Fundamental,
    Essential,
}

/// A 3x3 two-view model with its geometry tag.
#[derive(Debug, Clone)]
pub struct Model {
    pub matrix: Matrix3<f64>,
    pub kind: ModelKind,
}

impl Model {
    pub fn new(matrix: Matrix3<f64>, kind: ModelKind) -> Self {
        Self { matrix, kind }
    }

    pub fn homography(matrix: Matrix3<f64>) -> Self {
        Self::new(matrix, ModelKind::Homography)
    }

    pub fn fundamental(matrix: Matrix3<f64>) -> Self {
        Self::new(matrix, ModelKind::Fundamental)
    }

    pub fn essential(matrix: Matrix3<f64>) -> Self {
        Self::new(matrix, ModelKind::Essential)
    }

    /// True when every entry of the parameter block is finite.
    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }
}
