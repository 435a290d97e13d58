//! SIP (Simple Imaging Polynomial) forward and reverse transforms.
//!
//! The SIP convention (Shupe et al. 2005) layers a polynomial distortion
//! correction on top of a linear plate solution. The forward direction maps
//! pixel coordinates to intermediate world coordinates:
//!
//! ```text
//! delta = p - pixel_origin
//! iw    = CD · (delta + P(delta))
//! ```
//!
//! and the reverse direction maps intermediate world coordinates back to
//! pixels with a polynomial fitted in CD-normalized intermediate space:
//!
//! ```text
//! delta = CD⁻¹ · w
//! p     = pixel_origin + delta + Q(delta)
//! ```
//!
//! In both directions the polynomial is a correction *added to the
//! identity* in the origin-relative frame; it represents the residual
//! distortion after the dominant linear term. A correctly fitted pair
//! satisfies `reverse(forward(p)) ≈ p` to the fit residual — an invariant
//! of the fit, not an algebraic identity, since both polynomials are
//! independent approximations.
//!
//! The `convert_*` constructors re-derive the SIP correction polynomial
//! from a raw or scaled [`PolynomialTransform`] describing the full mapping
//! (including its linear part), by composing the appropriate affines and
//! subtracting the identity. This is exact coefficient algebra, not a
//! refit.

use tracing::debug;

use crate::error::Result;
use crate::geom::{
    check_finite, map_batch, AffineTransform, LinearTransform, Matrix2x2, Point2D,
};
use crate::polynomial::{coeff_index, PolynomialTransform, ScaledPolynomialTransform};

/// Shared read surface of the two SIP transform directions: the pixel
/// origin the correction polynomial is expressed about, the CD matrix, and
/// the correction polynomial itself.
pub trait SipTransform {
    fn pixel_origin(&self) -> Point2D;
    fn cd_matrix(&self) -> &LinearTransform;
    fn poly(&self) -> &PolynomialTransform;
}

/// Subtract the identity map from a polynomial expressed in an
/// origin-relative frame, leaving only the SIP correction term.
fn subtract_identity(poly: &mut PolynomialTransform) {
    poly.x_coeffs[coeff_index(1, 0)] -= 1.0;
    poly.y_coeffs[coeff_index(0, 1)] -= 1.0;
}

// ── Forward: pixel → intermediate world ─────────────────────────────────────

/// Maps pixel coordinates to intermediate world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SipForwardTransform {
    pixel_origin: Point2D,
    cd_matrix: LinearTransform,
    poly: PolynomialTransform,
}

impl SipTransform for SipForwardTransform {
    fn pixel_origin(&self) -> Point2D {
        self.pixel_origin
    }

    fn cd_matrix(&self) -> &LinearTransform {
        &self.cd_matrix
    }

    fn poly(&self) -> &PolynomialTransform {
        &self.poly
    }
}

impl SipForwardTransform {
    /// Construct from already-SIP-form parts. The polynomial must be
    /// expressed in displacements relative to `pixel_origin`.
    pub fn new(
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
        forward_sip_poly: PolynomialTransform,
    ) -> Self {
        Self {
            pixel_origin,
            cd_matrix,
            poly: forward_sip_poly,
        }
    }

    /// Evaluate: `CD · (delta + P(delta))` with `delta = p - pixel_origin`.
    pub fn apply(&self, p: Point2D) -> Point2D {
        let delta = Point2D::from(p - self.pixel_origin);
        let corrected = delta.coords + self.poly.apply(delta).coords;
        Point2D::from(self.cd_matrix.apply(corrected))
    }

    /// Batch form of [`apply`](Self::apply): same rule per point, output
    /// order and length match the input. Fails on any non-finite input.
    pub fn transform_pixels(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        check_finite(points)?;
        Ok(map_batch(points, |p| self.apply(p)))
    }

    /// Convert a raw polynomial describing the *full* pixel → intermediate
    /// mapping into SIP form about the given origin and CD matrix.
    ///
    /// The result evaluates identically to `poly` (to floating-point
    /// precision): the polynomial is recentered into the origin-relative
    /// frame, the CD action is divided out, and the identity subtracted.
    pub fn convert_poly(
        poly: &PolynomialTransform,
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
    ) -> Result<Self> {
        let cd_inverse = cd_matrix.invert()?;
        // delta ↦ CD⁻¹ · poly(delta + origin), then drop the identity.
        let mut sip_poly = poly
            .padded_to_degree(poly.degree().max(1))
            .compose_with_input(&AffineTransform::from_translation(
                pixel_origin.coords,
            ))
            .compose_with_output(&AffineTransform::from_linear(cd_inverse));
        subtract_identity(&mut sip_poly);
        debug!(
            degree = sip_poly.degree(),
            "converted raw polynomial to forward SIP form"
        );
        Ok(Self::new(pixel_origin, cd_matrix, sip_poly))
    }

    /// Convert a scaled polynomial, collapsing its conditioning affines
    /// first, with an explicitly supplied frame.
    pub fn convert_scaled(
        scaled: &ScaledPolynomialTransform,
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
    ) -> Result<Self> {
        Self::convert_poly(&scaled.to_unscaled(), pixel_origin, cd_matrix)
    }

    /// Convert a self-describing scaled polynomial: the frame is inferred
    /// from the conditioning affines. The pixel origin is the point the
    /// input affine maps to zero; the CD matrix is the output affine's
    /// linear part.
    pub fn convert_scaled_self(scaled: &ScaledPolynomialTransform) -> Result<Self> {
        let input_inverse = scaled.input_scaling().invert()?;
        let pixel_origin = Point2D::from(input_inverse.translation());
        let cd_matrix = *scaled.output_scaling().linear();
        Self::convert_scaled(scaled, pixel_origin, cd_matrix)
    }

    /// Best local affine approximation at the pixel origin:
    /// `CD · (I + J)` with `J` the correction Jacobian at zero
    /// displacement. Exactly the CD matrix when the correction is zero.
    pub fn linearize(&self) -> LinearTransform {
        let jac = self.poly.jacobian(Point2D::origin());
        LinearTransform::new(self.cd_matrix.matrix() * (Matrix2x2::identity() + jac))
    }
}

// ── Reverse: intermediate world → pixel ─────────────────────────────────────

/// Maps intermediate world coordinates back to pixel coordinates.
///
/// The CD inverse is computed once at construction; a singular CD matrix is
/// rejected there rather than at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct SipReverseTransform {
    pixel_origin: Point2D,
    cd_matrix: LinearTransform,
    cd_inverse: LinearTransform,
    poly: PolynomialTransform,
}

impl SipTransform for SipReverseTransform {
    fn pixel_origin(&self) -> Point2D {
        self.pixel_origin
    }

    fn cd_matrix(&self) -> &LinearTransform {
        &self.cd_matrix
    }

    fn poly(&self) -> &PolynomialTransform {
        &self.poly
    }
}

impl SipReverseTransform {
    /// Construct from already-SIP-form parts. The polynomial must be
    /// expressed in CD-normalized intermediate displacements.
    pub fn new(
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
        reverse_sip_poly: PolynomialTransform,
    ) -> Result<Self> {
        let cd_inverse = cd_matrix.invert()?;
        Ok(Self {
            pixel_origin,
            cd_matrix,
            cd_inverse,
            poly: reverse_sip_poly,
        })
    }

    /// Evaluate: `pixel_origin + delta + Q(delta)` with `delta = CD⁻¹ · w`.
    pub fn apply(&self, w: Point2D) -> Point2D {
        let delta = Point2D::from(self.cd_inverse.apply(w.coords));
        let corrected = delta.coords + self.poly.apply(delta).coords;
        self.pixel_origin + corrected
    }

    /// Batch form of [`apply`](Self::apply); same contract as
    /// [`SipForwardTransform::transform_pixels`].
    pub fn transform_pixels(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        check_finite(points)?;
        Ok(map_batch(points, |p| self.apply(p)))
    }

    /// Convert a raw polynomial describing the *full* intermediate → pixel
    /// mapping into SIP form about the given origin and CD matrix.
    pub fn convert_poly(
        poly: &PolynomialTransform,
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
    ) -> Result<Self> {
        // delta ↦ poly(CD · delta) - origin, then drop the identity.
        let mut sip_poly = poly
            .padded_to_degree(poly.degree().max(1))
            .compose_with_input(&AffineTransform::from_linear(cd_matrix))
            .compose_with_output(&AffineTransform::from_translation(-pixel_origin.coords));
        subtract_identity(&mut sip_poly);
        debug!(
            degree = sip_poly.degree(),
            "converted raw polynomial to reverse SIP form"
        );
        Self::new(pixel_origin, cd_matrix, sip_poly)
    }

    /// Convert a scaled polynomial with an explicitly supplied frame.
    pub fn convert_scaled(
        scaled: &ScaledPolynomialTransform,
        pixel_origin: Point2D,
        cd_matrix: LinearTransform,
    ) -> Result<Self> {
        Self::convert_poly(&scaled.to_unscaled(), pixel_origin, cd_matrix)
    }

    /// Convert a self-describing scaled polynomial. The reverse direction's
    /// output is pixels, so the pixel origin comes from the output affine's
    /// translation and the CD matrix from the inverse of the input affine's
    /// linear part (the input domain is CD-scaled intermediate space).
    pub fn convert_scaled_self(scaled: &ScaledPolynomialTransform) -> Result<Self> {
        let pixel_origin = Point2D::from(scaled.output_scaling().translation());
        let cd_matrix = scaled.input_scaling().linear().invert()?;
        Self::convert_scaled(scaled, pixel_origin, cd_matrix)
    }

    /// Best local affine approximation at zero intermediate displacement:
    /// `(I + J) · CD⁻¹`. Exactly `CD⁻¹` when the correction is zero.
    pub fn linearize(&self) -> LinearTransform {
        let jac = self.poly.jacobian(Point2D::origin());
        LinearTransform::new((Matrix2x2::identity() + jac) * self.cd_inverse.matrix())
    }
}
