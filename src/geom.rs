//! Points, 2×2 linear transforms, and affine transforms.
//!
//! [`LinearTransform`] is the CD-matrix type: pixel scale, rotation, and
//! skew in a single 2×2 map. [`AffineTransform`] adds a translation and is
//! used for the numerical-conditioning affines of
//! [`ScaledPolynomialTransform`](crate::ScaledPolynomialTransform) and for
//! pixel-grid relabeling when a WCS is rotated or resized.
//!
//! Both are small immutable value types; every operation returns a new
//! instance.

use nalgebra::{Matrix2, Point2, Vector2};
use rayon::prelude::*;

use crate::error::{Error, Result};

/// 2D point in pixel or intermediate-world coordinates.
pub type Point2D = Point2<f64>;
/// 2D displacement / translation vector.
pub type Vector2D = Vector2<f64>;
/// Plain 2×2 matrix of coordinates.
pub type Matrix2x2 = Matrix2<f64>;

/// Determinant threshold below which a 2×2 matrix is treated as singular.
const SINGULAR_DET: f64 = 1e-30;

/// Batch sizes at or above this use rayon.
pub(crate) const PARALLEL_BATCH_THRESHOLD: usize = 1024;

/// Reject non-finite coordinates in a batch input. Any single bad point
/// fails the whole batch; nothing is partially transformed.
pub(crate) fn check_finite(points: &[Point2D]) -> Result<()> {
    for (index, p) in points.iter().enumerate() {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Err(Error::NonFiniteInput {
                index,
                x: p.x,
                y: p.y,
            });
        }
    }
    Ok(())
}

/// Apply a pure point mapping to a batch, preserving order. Parallelized
/// for large batches; each point is independent.
pub(crate) fn map_batch<F>(points: &[Point2D], f: F) -> Vec<Point2D>
where
    F: Fn(Point2D) -> Point2D + Sync,
{
    if points.len() >= PARALLEL_BATCH_THRESHOLD {
        points.par_iter().map(|&p| f(p)).collect()
    } else {
        points.iter().map(|&p| f(p)).collect()
    }
}

/// A 2×2 linear map: the CD matrix of an astrometric solution.
///
/// Encodes plate scale, rotation, parity, and pixel-axis skew. Must be
/// non-singular for any reverse-direction operation to be well defined;
/// [`invert`](LinearTransform::invert) enforces this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    matrix: Matrix2x2,
}

impl LinearTransform {
    /// Wrap a 2×2 matrix.
    pub fn new(matrix: Matrix2x2) -> Self {
        Self { matrix }
    }

    /// The identity map.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix2x2::identity(),
        }
    }

    /// Diagonal scaling by `(sx, sy)`.
    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self {
            matrix: Matrix2x2::new(sx, 0.0, 0.0, sy),
        }
    }

    /// Counterclockwise rotation by `theta` radians.
    pub fn rotation(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self {
            matrix: Matrix2x2::new(c, -s, s, c),
        }
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> &Matrix2x2 {
        &self.matrix
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Apply to a displacement vector.
    pub fn apply(&self, v: Vector2D) -> Vector2D {
        self.matrix * v
    }

    /// Invert. Fails with [`Error::SingularMatrix`] when the determinant
    /// is below the singularity threshold.
    pub fn invert(&self) -> Result<LinearTransform> {
        let det = self.matrix.determinant();
        if det.abs() < SINGULAR_DET {
            return Err(Error::SingularMatrix { det });
        }
        let inv_det = 1.0 / det;
        let m = &self.matrix;
        Ok(Self {
            matrix: Matrix2x2::new(
                m[(1, 1)] * inv_det,
                -m[(0, 1)] * inv_det,
                -m[(1, 0)] * inv_det,
                m[(0, 0)] * inv_det,
            ),
        })
    }

    /// Composition: `self.then(other)` is the map `p ↦ other(self(p))`.
    pub fn then(&self, other: &LinearTransform) -> LinearTransform {
        Self {
            matrix: other.matrix * self.matrix,
        }
    }
}

/// An affine map `p ↦ L·p + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    linear: LinearTransform,
    translation: Vector2D,
}

impl AffineTransform {
    pub fn new(linear: LinearTransform, translation: Vector2D) -> Self {
        Self {
            linear,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            linear: LinearTransform::identity(),
            translation: Vector2D::zeros(),
        }
    }

    /// Pure linear map, zero translation.
    pub fn from_linear(linear: LinearTransform) -> Self {
        Self {
            linear,
            translation: Vector2D::zeros(),
        }
    }

    /// Pure translation, identity linear part.
    pub fn from_translation(translation: Vector2D) -> Self {
        Self {
            linear: LinearTransform::identity(),
            translation,
        }
    }

    pub fn linear(&self) -> &LinearTransform {
        &self.linear
    }

    pub fn translation(&self) -> Vector2D {
        self.translation
    }

    /// Apply to a point.
    pub fn apply(&self, p: Point2D) -> Point2D {
        Point2D::from(self.linear.apply(p.coords) + self.translation)
    }

    /// Invert: `(L, t)⁻¹ = (L⁻¹, -L⁻¹ t)`.
    pub fn invert(&self) -> Result<AffineTransform> {
        let linear_inv = self.linear.invert()?;
        let translation = -linear_inv.apply(self.translation);
        Ok(Self {
            linear: linear_inv,
            translation,
        })
    }

    /// The map `p ↦ other(self(p))`.
    pub fn then(&self, other: &AffineTransform) -> AffineTransform {
        Self {
            linear: self.linear.then(&other.linear),
            translation: other.linear.apply(self.translation) + other.translation,
        }
    }
}
