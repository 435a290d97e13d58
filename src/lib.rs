//! # astrom-sip
//!
//! SIP (Simple Imaging Polynomial) astrometric distortion transforms.
//!
//! The SIP convention (Shupe et al. 2005, FITS-WCS) models the geometric
//! distortion of an imaging instrument's focal plane as a bivariate
//! polynomial correction layered on a linear plate solution (the CD
//! matrix). This crate implements the polynomial-transform algebra behind
//! that convention and assembles it into complete pixel ↔ sky mappings:
//!
//! - [`PolynomialTransform`] / [`ScaledPolynomialTransform`] — bivariate
//!   polynomial maps ℝ²→ℝ², raw or wrapped with numerical-conditioning
//!   affines, with exact composition algebra (affine substitution,
//!   Jacobians)
//! - [`SipForwardTransform`] / [`SipReverseTransform`] — the two SIP
//!   directions (pixel → intermediate world and back), with `convert_*`
//!   constructors that re-derive SIP correction coefficients from fitted
//!   polynomials and [`linearize`](SipForwardTransform::linearize) for
//!   local affine approximation
//! - [`make_wcs`] / [`SkyWcs`] — composition with a gnomonic (TAN) sky
//!   projection into a full world-coordinate mapping, plus the pixel-grid
//!   operators [`transform_wcs_pixels`] and [`rotate_wcs_pixels_by_90`]
//!
//! Coefficient *fitting* is out of scope: this crate consumes
//! already-fitted coefficients (e.g. from an astrometric calibration
//! pipeline or a FITS header) and only converts, evaluates, linearizes,
//! and re-parameterizes them.
//!
//! ## Example
//!
//! ```
//! use astrom_sip::{
//!     make_wcs, LinearTransform, Point2D, PolynomialTransform, SipForwardTransform,
//!     SipReverseTransform, SkyPoint,
//! };
//!
//! // 1 arcsec/px plate solution about the detector center, no distortion.
//! let origin = Point2D::new(512.0, 512.0);
//! let cd = LinearTransform::scaling(4.8481e-6, 4.8481e-6); // rad/px
//! let forward = SipForwardTransform::new(origin, cd, PolynomialTransform::zeroed(2));
//! let reverse = SipReverseTransform::new(origin, cd, PolynomialTransform::zeroed(2)).unwrap();
//!
//! let wcs = make_wcs(forward, reverse, SkyPoint::from_degrees(83.6, 22.0));
//! let sky = wcs.pixel_to_sky(Point2D::new(600.0, 400.0));
//! let back = wcs.sky_to_pixel(sky).unwrap();
//! assert!((back.x - 600.0).abs() < 1e-6 && (back.y - 400.0).abs() < 1e-6);
//! ```
//!
//! All transform types are immutable value objects; evaluation is pure and
//! safe to call concurrently. Batch operations preserve input order and
//! parallelize internally for large point sets.

mod error;
mod geom;
mod polynomial;
mod sip;
mod wcs;

pub use error::{Error, Result};
pub use geom::{AffineTransform, LinearTransform, Matrix2x2, Point2D, Vector2D};
pub use polynomial::{coeff_index, num_coeffs, PolynomialTransform, ScaledPolynomialTransform};
pub use sip::{SipForwardTransform, SipReverseTransform, SipTransform};
pub use wcs::{
    inverse_tan_project, make_wcs, rotate_wcs_pixels_by_90, tan_project, transform_wcs_pixels,
    SkyPoint, SkyWcs,
};
