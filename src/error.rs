//! Error types for transform construction and evaluation.
//!
//! All failures here are caller precondition violations (bad coefficient
//! tables, singular matrices, non-finite coordinates), not transient
//! conditions — there is nothing to retry. Operations fail fast and name
//! the violated precondition rather than propagating NaN coordinates.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Precondition violations surfaced by transform construction and evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A coefficient vector's length is not a triangular count
    /// `(d+1)(d+2)/2` for any degree `d`.
    #[error("coefficient vector length {len} does not correspond to any polynomial degree")]
    InvalidDegree { len: usize },

    /// The x- and y-axis coefficient sets imply different polynomial degrees.
    #[error("polynomial degree mismatch between axes: x has degree {x_degree}, y has degree {y_degree}")]
    DegreeMismatch { x_degree: usize, y_degree: usize },

    /// A matrix that must be inverted (CD matrix, scaling affine) is
    /// singular or numerically indistinguishable from singular.
    #[error("matrix is singular (|det| = {det:.3e})")]
    SingularMatrix { det: f64 },

    /// A coordinate in a batch input was NaN or infinite.
    #[error("non-finite input coordinate ({x}, {y}) at index {index}")]
    NonFiniteInput { index: usize, x: f64, y: f64 },

    /// Pixel-grid dimensions must be positive in both axes.
    #[error("invalid pixel-grid dimensions ({width}, {height})")]
    InvalidDimensions { width: i64, height: i64 },
}
