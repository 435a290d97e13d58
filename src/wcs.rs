//! World-coordinate assembly: TAN projection, [`SkyWcs`], and pixel-grid
//! operators.
//!
//! [`make_wcs`] composes a matched SIP forward/reverse pair with a sky
//! origin into a complete pixel ↔ sky mapping: the forward half applies the
//! SIP forward transform and then the inverse gnomonic (TAN) projection
//! anchored at the sky origin; the reverse half inverts that composition.
//! The intermediate world coordinates produced by the SIP transform are
//! tangent-plane offsets in radians, so the CD matrix is expected in
//! radians per pixel here.
//!
//! Whether the supplied forward and reverse transforms actually describe
//! consistent geometry is a caller contract: it is not detectable from the
//! pair alone and is not checked.
//!
//! The pixel-grid operators re-express an existing mapping over relabeled
//! pixel coordinates. [`rotate_wcs_pixels_by_90`] handles quarter-turn
//! rotations of the detector grid, which swap axes and flip signs; the SIP
//! polynomial coefficients are re-derived exactly under the substitution
//! rather than refit.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geom::{
    check_finite, AffineTransform, LinearTransform, Matrix2x2, Point2D, Vector2D,
    PARALLEL_BATCH_THRESHOLD,
};
use crate::polynomial::PolynomialTransform;
use crate::sip::{SipForwardTransform, SipReverseTransform, SipTransform};

/// A position on the celestial sphere, (RA, Dec) in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPoint {
    pub ra: f64,
    pub dec: f64,
}

impl SkyPoint {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra: ra_deg.to_radians(),
            dec: dec_deg.to_radians(),
        }
    }
}

// ── TAN projection ──────────────────────────────────────────────────────────

/// Forward gnomonic (TAN) projection.
///
/// Projects `sky` onto the tangent plane at `origin`. Returns `(ξ, η)` in
/// radians, or `None` if the point is on or behind the tangent plane.
///
/// Reference: Calabretta & Greisen (2002), FITS WCS Paper II, §5.1.1.
#[inline]
pub fn tan_project(sky: SkyPoint, origin: SkyPoint) -> Option<(f64, f64)> {
    let da = sky.ra - origin.ra;
    let sin_dec = sky.dec.sin();
    let cos_dec = sky.dec.cos();
    let sin_dec0 = origin.dec.sin();
    let cos_dec0 = origin.dec.cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None; // behind or on the tangent plane
    }

    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic (TAN) projection.
///
/// Given tangent-plane coordinates `(ξ, η)` in radians at `origin`, returns
/// the celestial position.
#[inline]
pub fn inverse_tan_project(xi: f64, eta: f64, origin: SkyPoint) -> SkyPoint {
    let sin_dec0 = origin.dec.sin();
    let cos_dec0 = origin.dec.cos();
    let rho_sq = xi * xi + eta * eta;

    if rho_sq < 1e-30 {
        // On the reference point itself
        return origin;
    }

    let rho = rho_sq.sqrt();
    let c = rho.atan(); // for TAN projection, c = atan(rho)
    let sin_c = c.sin();
    let cos_c = c.cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = origin.ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    SkyPoint::new(ra, dec)
}

// ── SkyWcs ──────────────────────────────────────────────────────────────────

/// A complete pixel ↔ sky mapping: a matched SIP transform pair plus the
/// sky origin the tangent plane is anchored at.
///
/// Immutable after construction; evaluation is pure and thread-safe.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyWcs {
    forward: SipForwardTransform,
    reverse: SipReverseTransform,
    sky_origin: SkyPoint,
}

/// Compose a matched SIP forward/reverse pair with a sky origin.
///
/// The pair should describe consistent geometry (same or compatible pixel
/// origin and CD matrix); this is trusted, not verified.
pub fn make_wcs(
    forward: SipForwardTransform,
    reverse: SipReverseTransform,
    sky_origin: SkyPoint,
) -> SkyWcs {
    SkyWcs {
        forward,
        reverse,
        sky_origin,
    }
}

impl SkyWcs {
    pub fn forward(&self) -> &SipForwardTransform {
        &self.forward
    }

    pub fn reverse(&self) -> &SipReverseTransform {
        &self.reverse
    }

    pub fn sky_origin(&self) -> SkyPoint {
        self.sky_origin
    }

    /// Pixel → sky: SIP forward, then inverse TAN projection.
    pub fn pixel_to_sky(&self, p: Point2D) -> SkyPoint {
        let iw = self.forward.apply(p);
        inverse_tan_project(iw.x, iw.y, self.sky_origin)
    }

    /// Sky → pixel: TAN projection, then SIP reverse. `None` if the sky
    /// point is on or behind the tangent plane.
    pub fn sky_to_pixel(&self, sky: SkyPoint) -> Option<Point2D> {
        let (xi, eta) = tan_project(sky, self.sky_origin)?;
        Some(self.reverse.apply(Point2D::new(xi, eta)))
    }

    /// Re-express this mapping over affinely relabeled pixel coordinates:
    /// the result satisfies `new.pixel_to_sky(s(p)) == self.pixel_to_sky(p)`.
    ///
    /// Both SIP transforms are conjugated by the relabeling: with
    /// `s(p) = L·p + t`, the new pixel origin is `s(origin)`, the new CD
    /// matrix is `CD·L⁻¹`, and the correction polynomial becomes
    /// `L ∘ poly ∘ L⁻¹` — exact coefficient re-derivation, no refit.
    pub fn with_transformed_pixels(&self, s: &AffineTransform) -> Result<SkyWcs> {
        let linear = *s.linear();
        let linear_inv = linear.invert()?;
        let conjugate = |poly: &PolynomialTransform| {
            poly.compose_with_input(&AffineTransform::from_linear(linear_inv))
                .compose_with_output(&AffineTransform::from_linear(linear))
        };

        let forward = SipForwardTransform::new(
            s.apply(self.forward.pixel_origin()),
            linear_inv.then(self.forward.cd_matrix()),
            conjugate(self.forward.poly()),
        );
        let reverse = SipReverseTransform::new(
            s.apply(self.reverse.pixel_origin()),
            linear_inv.then(self.reverse.cd_matrix()),
            conjugate(self.reverse.poly()),
        )?;
        Ok(SkyWcs {
            forward,
            reverse,
            sky_origin: self.sky_origin,
        })
    }
}

// ── Batch evaluation ────────────────────────────────────────────────────────

/// Apply a mapping's pixel → sky direction to a set of points.
///
/// Same batch contract as the SIP transforms: output order and length match
/// the input, and any non-finite input point fails the whole batch.
pub fn transform_wcs_pixels(wcs: &SkyWcs, points: &[Point2D]) -> Result<Vec<SkyPoint>> {
    check_finite(points)?;
    if points.len() >= PARALLEL_BATCH_THRESHOLD {
        Ok(points.par_iter().map(|&p| wcs.pixel_to_sky(p)).collect())
    } else {
        Ok(points.iter().map(|&p| wcs.pixel_to_sky(p)).collect())
    }
}

// ── Quarter-turn grid rotation ──────────────────────────────────────────────

/// Re-derive a mapping for a pixel grid rotated by `n_quarter` quarter
/// turns counterclockwise.
///
/// `dimensions` is the `(width, height)` of the *pre-rotation* grid;
/// 90°/270° turns swap them. Pixel coordinates are 0-based, so the grid
/// relabeling for one quarter turn is `(x, y) ↦ (height - 1 - y, x)`.
/// `n_quarter` is periodic and normalized modulo 4 (negative values
/// included).
///
/// The returned mapping evaluated at the rotated coordinates of any pixel
/// reproduces the sky coordinate the original mapping assigns to that
/// pixel.
pub fn rotate_wcs_pixels_by_90(
    wcs: &SkyWcs,
    n_quarter: i32,
    dimensions: (u32, u32),
) -> Result<SkyWcs> {
    let (width, height) = dimensions;
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions {
            width: width as i64,
            height: height as i64,
        });
    }
    let w = width as f64;
    let h = height as f64;
    let nq = n_quarter.rem_euclid(4);

    let relabel = match nq {
        0 => return Ok(wcs.clone()),
        1 => AffineTransform::new(
            LinearTransform::new(Matrix2x2::new(0.0, -1.0, 1.0, 0.0)),
            Vector2D::new(h - 1.0, 0.0),
        ),
        2 => AffineTransform::new(
            LinearTransform::new(Matrix2x2::new(-1.0, 0.0, 0.0, -1.0)),
            Vector2D::new(w - 1.0, h - 1.0),
        ),
        3 => AffineTransform::new(
            LinearTransform::new(Matrix2x2::new(0.0, 1.0, -1.0, 0.0)),
            Vector2D::new(0.0, w - 1.0),
        ),
        _ => unreachable!(),
    };

    debug!(n_quarter = nq, width, height, "rotating WCS pixel grid");
    wcs.with_transformed_pixels(&relabel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::{coeff_index, num_coeffs, PolynomialTransform};
    use approx::assert_relative_eq;

    #[test]
    fn test_tan_project_roundtrip() {
        let origin = SkyPoint::new(1.2, 0.3);
        let test_points = [(1.21, 0.31), (1.25, 0.25), (1.15, 0.35), (1.0, 0.0)];
        for &(ra, dec) in &test_points {
            let sky = SkyPoint::new(ra, dec);
            let (xi, eta) = tan_project(sky, origin).unwrap();
            let back = inverse_tan_project(xi, eta, origin);
            assert_relative_eq!(back.ra, ra, epsilon = 1e-12);
            assert_relative_eq!(back.dec, dec, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tan_project_at_reference() {
        let origin = SkyPoint::new(2.0, -0.5);
        let (xi, eta) = tan_project(origin, origin).unwrap();
        assert!(xi.abs() < 1e-15 && eta.abs() < 1e-15);
    }

    #[test]
    fn test_tan_project_behind() {
        let origin = SkyPoint::new(0.0, 0.0);
        assert!(tan_project(SkyPoint::new(std::f64::consts::PI, 0.0), origin).is_none());
    }

    /// WCS over a 1024² detector at ~1 arcsec/px with a small quadratic
    /// distortion, reverse correction negated from the forward one.
    fn test_wcs() -> SkyWcs {
        let scale = 4.8e-6; // ~1 arcsec/px in radians
        let cd = LinearTransform::scaling(scale, scale);
        let origin = Point2D::new(512.0, 512.0);
        let n = num_coeffs(2);
        let mut ax = vec![0.0; n];
        let mut ay = vec![0.0; n];
        ax[coeff_index(2, 0)] = 5.0e-10;
        ax[coeff_index(1, 1)] = -2.0e-10;
        ay[coeff_index(0, 2)] = 4.0e-10;
        let fwd_poly = PolynomialTransform::new(ax.clone(), ay.clone()).unwrap();
        let rev_poly = PolynomialTransform::new(
            ax.iter().map(|c| -c).collect(),
            ay.iter().map(|c| -c).collect(),
        )
        .unwrap();
        make_wcs(
            SipForwardTransform::new(origin, cd, fwd_poly),
            SipReverseTransform::new(origin, cd, rev_poly).unwrap(),
            SkyPoint::new(1.2, 0.3),
        )
    }

    #[test]
    fn test_pixel_sky_roundtrip() {
        let wcs = test_wcs();
        for &(x, y) in &[(512.0, 512.0), (0.0, 0.0), (1023.0, 17.0), (100.0, 900.0)] {
            let p = Point2D::new(x, y);
            let sky = wcs.pixel_to_sky(p);
            let back = wcs.sky_to_pixel(sky).unwrap();
            assert!((back.x - p.x).abs() < 1e-6, "x residual {}", back.x - p.x);
            assert!((back.y - p.y).abs() < 1e-6, "y residual {}", back.y - p.y);
        }
    }

    #[test]
    fn test_pixel_origin_maps_to_sky_origin() {
        let wcs = test_wcs();
        let sky = wcs.pixel_to_sky(Point2D::new(512.0, 512.0));
        assert_relative_eq!(sky.ra, 1.2, epsilon = 1e-12);
        assert_relative_eq!(sky.dec, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_transform_wcs_pixels_matches_scalar() {
        let wcs = test_wcs();
        let points: Vec<Point2D> = (0..40)
            .map(|k| Point2D::new(25.0 * k as f64, 10.0 * k as f64))
            .collect();
        let batch = transform_wcs_pixels(&wcs, &points).unwrap();
        assert_eq!(batch.len(), points.len());
        for (out, &p) in batch.iter().zip(&points) {
            let direct = wcs.pixel_to_sky(p);
            assert_eq!(out.ra, direct.ra);
            assert_eq!(out.dec, direct.dec);
        }
    }

    /// Grid relabeling for one quarter turn, mirroring the operator's
    /// internal convention.
    fn rotate_pixel(p: Point2D, nq: i32, dims: (u32, u32)) -> Point2D {
        let w = dims.0 as f64;
        let h = dims.1 as f64;
        match nq.rem_euclid(4) {
            0 => p,
            1 => Point2D::new(h - 1.0 - p.y, p.x),
            2 => Point2D::new(w - 1.0 - p.x, h - 1.0 - p.y),
            3 => Point2D::new(p.y, w - 1.0 - p.x),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_rotate_preserves_sky_coordinates() {
        let wcs = test_wcs();
        let dims = (1024, 1024);
        for nq in 0..4 {
            let rotated = rotate_wcs_pixels_by_90(&wcs, nq, dims).unwrap();
            for &(x, y) in &[(0.0, 0.0), (512.0, 512.0), (1023.0, 0.0), (100.0, 900.0)] {
                let p = Point2D::new(x, y);
                let original = wcs.pixel_to_sky(p);
                let via = rotated.pixel_to_sky(rotate_pixel(p, nq, dims));
                assert_relative_eq!(via.ra, original.ra, epsilon = 1e-12);
                assert_relative_eq!(via.dec, original.dec, epsilon = 1e-12);
            }
        }
    }

    /// Non-square grid: (1000, 2000), one quarter turn. The pre-rotation
    /// corner (0, 0) relabels to (1999, 0) on the (2000, 1000) rotated grid
    /// and must evaluate to the same sky coordinate.
    #[test]
    fn test_rotate_non_square_corner() {
        let wcs = test_wcs();
        let dims = (1000, 2000);
        let rotated = rotate_wcs_pixels_by_90(&wcs, 1, dims).unwrap();
        let original = wcs.pixel_to_sky(Point2D::new(0.0, 0.0));
        let corner = rotate_pixel(Point2D::new(0.0, 0.0), 1, dims);
        assert_eq!(corner, Point2D::new(1999.0, 0.0));
        let via = rotated.pixel_to_sky(corner);
        assert_relative_eq!(via.ra, original.ra, epsilon = 1e-12);
        assert_relative_eq!(via.dec, original.dec, epsilon = 1e-12);
    }

    /// One quarter turn followed by three more returns the original mapping.
    #[test]
    fn test_rotate_involution() {
        let wcs = test_wcs();
        let dims = (1000, 2000);
        let rotated_dims = (dims.1, dims.0);
        let once = rotate_wcs_pixels_by_90(&wcs, 1, dims).unwrap();
        let back = rotate_wcs_pixels_by_90(&once, 3, rotated_dims).unwrap();
        for &(x, y) in &[(0.0, 0.0), (512.0, 512.0), (999.0, 1999.0), (31.0, 77.0)] {
            let p = Point2D::new(x, y);
            let a = wcs.pixel_to_sky(p);
            let b = back.pixel_to_sky(p);
            assert_relative_eq!(a.ra, b.ra, epsilon = 1e-12);
            assert_relative_eq!(a.dec, b.dec, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_n_quarter_normalized_modulo_4() {
        let wcs = test_wcs();
        let dims = (1024, 1024);
        let a = rotate_wcs_pixels_by_90(&wcs, 1, dims).unwrap();
        let b = rotate_wcs_pixels_by_90(&wcs, 5, dims).unwrap();
        let c = rotate_wcs_pixels_by_90(&wcs, -3, dims).unwrap();
        for &(x, y) in &[(0.0, 0.0), (700.0, 300.0)] {
            let p = Point2D::new(x, y);
            let sa = a.pixel_to_sky(p);
            let sb = b.pixel_to_sky(p);
            let sc = c.pixel_to_sky(p);
            assert_eq!(sa, sb);
            assert_eq!(sa, sc);
        }
    }

    #[test]
    fn test_rotate_rejects_zero_dimensions() {
        let wcs = test_wcs();
        assert!(matches!(
            rotate_wcs_pixels_by_90(&wcs, 1, (0, 100)),
            Err(Error::InvalidDimensions { .. })
        ));
    }
}
