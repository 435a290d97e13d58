//! Bivariate polynomial transform algebra.
//!
//! A [`PolynomialTransform`] is a map ℝ²→ℝ² where each output axis is a
//! polynomial in the input coordinates:
//!
//! ```text
//! x' = Σ cx_ij · x^i · y^j      (i + j ≤ degree)
//! y' = Σ cy_ij · x^i · y^j
//! ```
//!
//! Coefficients are stored per axis as a flat triangular vector; use
//! [`coeff_index(i, j)`](coeff_index) to address a term. Terms are
//! enumerated by increasing total degree, then decreasing `i`:
//!
//! ```text
//! sum=0: (0,0)=0
//! sum=1: (1,0)=1, (0,1)=2
//! sum=2: (2,0)=3, (1,1)=4, (0,2)=5
//! ```
//!
//! Because the ordering groups terms by total degree, a degree-`m`
//! coefficient vector is a prefix of a degree-`n` vector for `m < n`, which
//! the composition algebra exploits when accumulating products.
//!
//! Polynomials above modest degree (≳4) are ill-conditioned when evaluated
//! directly over pixel-sized domains (thousands of units): the high-order
//! coefficients become vanishingly small and the normal equations of the
//! upstream fit lose precision. [`ScaledPolynomialTransform`] wraps a
//! polynomial with input/output conditioning affines that normalize the
//! working domain to roughly [-1, 1], and converts back to the raw form
//! exactly via the composition algebra.

use nalgebra::Matrix2;

use crate::error::{Error, Result};
use crate::geom::{check_finite, map_batch, AffineTransform, Matrix2x2, Point2D};

/// Number of coefficients for a full triangular polynomial of the given
/// degree: `(d+1)(d+2)/2`.
pub fn num_coeffs(degree: usize) -> usize {
    (degree + 1) * (degree + 2) / 2
}

/// Map exponent pair `(i, j)` to its flat index.
///
/// Terms are ordered by increasing sum, then decreasing `i`:
///   sum=1: (1,0)=1, (0,1)=2
///   sum=2: (2,0)=3, (1,1)=4, (0,2)=5
pub fn coeff_index(i: usize, j: usize) -> usize {
    let s = i + j;
    s * (s + 1) / 2 + j
}

/// Infer the polynomial degree from a coefficient vector length, or `None`
/// if the length is not a triangular count.
fn degree_from_len(len: usize) -> Option<usize> {
    let mut d = 0;
    loop {
        let n = num_coeffs(d);
        if n == len {
            return Some(d);
        }
        if n > len {
            return None;
        }
        d += 1;
    }
}

/// Powers `x^0 ..= x^degree`.
fn powers(x: f64, degree: usize) -> Vec<f64> {
    let mut p = Vec::with_capacity(degree + 1);
    let mut acc = 1.0;
    for _ in 0..=degree {
        p.push(acc);
        acc *= x;
    }
    p
}

/// Evaluate one axis: Σ coeffs[idx(i,j)] · xp[i] · yp[j].
fn eval_axis(coeffs: &[f64], degree: usize, xp: &[f64], yp: &[f64]) -> f64 {
    let mut result = 0.0;
    let mut idx = 0;
    for s in 0..=degree {
        for j in 0..=s {
            let i = s - j;
            result += coeffs[idx] * xp[i] * yp[j];
            idx += 1;
        }
    }
    result
}

/// Multiply two triangular polynomials of degrees `da` and `db`; the result
/// has degree `da + db`.
fn mul_tri(a: &[f64], da: usize, b: &[f64], db: usize) -> Vec<f64> {
    let mut out = vec![0.0; num_coeffs(da + db)];
    let mut ia = 0;
    for sa in 0..=da {
        for ja in 0..=sa {
            let ca = a[ia];
            ia += 1;
            if ca == 0.0 {
                continue;
            }
            let pa = sa - ja;
            let mut ib = 0;
            for sb in 0..=db {
                for jb in 0..=sb {
                    let cb = b[ib];
                    ib += 1;
                    if cb == 0.0 {
                        continue;
                    }
                    let pb = sb - jb;
                    out[coeff_index(pa + pb, ja + jb)] += ca * cb;
                }
            }
        }
    }
    out
}

/// A bivariate polynomial map ℝ²→ℝ², one triangular coefficient set per
/// output axis. Immutable value type.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialTransform {
    degree: usize,
    pub(crate) x_coeffs: Vec<f64>,
    pub(crate) y_coeffs: Vec<f64>,
}

impl PolynomialTransform {
    /// Create from per-axis coefficient vectors in [`coeff_index`] order.
    ///
    /// Both vectors must have a triangular length and imply the same degree.
    pub fn new(x_coeffs: Vec<f64>, y_coeffs: Vec<f64>) -> Result<Self> {
        let x_degree = degree_from_len(x_coeffs.len())
            .ok_or(Error::InvalidDegree { len: x_coeffs.len() })?;
        let y_degree = degree_from_len(y_coeffs.len())
            .ok_or(Error::InvalidDegree { len: y_coeffs.len() })?;
        if x_degree != y_degree {
            return Err(Error::DegreeMismatch { x_degree, y_degree });
        }
        Ok(Self {
            degree: x_degree,
            x_coeffs,
            y_coeffs,
        })
    }

    /// All-zero polynomial of the given degree.
    pub fn zeroed(degree: usize) -> Self {
        let n = num_coeffs(degree);
        Self {
            degree,
            x_coeffs: vec![0.0; n],
            y_coeffs: vec![0.0; n],
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// x-axis coefficient for the `x^i · y^j` term.
    pub fn coeff_x(&self, i: usize, j: usize) -> f64 {
        self.x_coeffs[coeff_index(i, j)]
    }

    /// y-axis coefficient for the `x^i · y^j` term.
    pub fn coeff_y(&self, i: usize, j: usize) -> f64 {
        self.y_coeffs[coeff_index(i, j)]
    }

    /// Evaluate at a point.
    pub fn apply(&self, p: Point2D) -> Point2D {
        let xp = powers(p.x, self.degree);
        let yp = powers(p.y, self.degree);
        Point2D::new(
            eval_axis(&self.x_coeffs, self.degree, &xp, &yp),
            eval_axis(&self.y_coeffs, self.degree, &xp, &yp),
        )
    }

    /// Batch form of [`apply`](Self::apply): same polynomial per point,
    /// output order and length match the input. Any non-finite input point
    /// fails the whole batch. Parallelized for large batches.
    pub fn apply_batch(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        check_finite(points)?;
        Ok(map_batch(points, |p| self.apply(p)))
    }

    /// Analytic Jacobian matrix at a point:
    /// `[[∂x'/∂x, ∂x'/∂y], [∂y'/∂x, ∂y'/∂y]]`.
    pub fn jacobian(&self, p: Point2D) -> Matrix2x2 {
        let xp = powers(p.x, self.degree);
        let yp = powers(p.y, self.degree);
        let mut jac = Matrix2::zeros();
        let mut idx = 0;
        for s in 0..=self.degree {
            for j in 0..=s {
                let i = s - j;
                let cx = self.x_coeffs[idx];
                let cy = self.y_coeffs[idx];
                idx += 1;
                if i > 0 {
                    let d = i as f64 * xp[i - 1] * yp[j];
                    jac[(0, 0)] += cx * d;
                    jac[(1, 0)] += cy * d;
                }
                if j > 0 {
                    let d = j as f64 * xp[i] * yp[j - 1];
                    jac[(0, 1)] += cx * d;
                    jac[(1, 1)] += cy * d;
                }
            }
        }
        jac
    }

    /// The transform `p ↦ self(affine(p))`.
    ///
    /// Substituting an affine map into a polynomial keeps the degree: each
    /// term `c · u^i · v^j` becomes `c · U(p)^i · V(p)^j` where `U`, `V` are
    /// the affine's two linear forms. Powers of the linear forms are built
    /// incrementally and combined by exact triangular products, so the
    /// result reproduces `self(affine(p))` to floating-point precision.
    pub fn compose_with_input(&self, affine: &AffineTransform) -> Self {
        let m = affine.linear().matrix();
        let t = affine.translation();
        // Linear forms U = m00·x + m01·y + tx, V = m10·x + m11·y + ty
        let u = vec![t.x, m[(0, 0)], m[(0, 1)]];
        let v = vec![t.y, m[(1, 0)], m[(1, 1)]];

        // upows[i] = U^i as a degree-i triangular polynomial
        let mut upows: Vec<Vec<f64>> = Vec::with_capacity(self.degree + 1);
        let mut vpows: Vec<Vec<f64>> = Vec::with_capacity(self.degree + 1);
        upows.push(vec![1.0]);
        vpows.push(vec![1.0]);
        for k in 1..=self.degree {
            let up = mul_tri(&upows[k - 1], k - 1, &u, 1);
            let vp = mul_tri(&vpows[k - 1], k - 1, &v, 1);
            upows.push(up);
            vpows.push(vp);
        }

        let n = num_coeffs(self.degree);
        let mut x_out = vec![0.0; n];
        let mut y_out = vec![0.0; n];
        let mut idx = 0;
        for s in 0..=self.degree {
            for j in 0..=s {
                let i = s - j;
                let cx = self.x_coeffs[idx];
                let cy = self.y_coeffs[idx];
                idx += 1;
                if cx == 0.0 && cy == 0.0 {
                    continue;
                }
                // U^i · V^j has degree i + j ≤ self.degree; its triangular
                // layout is a prefix of the output layout.
                let term = mul_tri(&upows[i], i, &vpows[j], j);
                for (k, &tc) in term.iter().enumerate() {
                    x_out[k] += cx * tc;
                    y_out[k] += cy * tc;
                }
            }
        }
        Self {
            degree: self.degree,
            x_coeffs: x_out,
            y_coeffs: y_out,
        }
    }

    /// The transform `p ↦ affine(self(p))`.
    ///
    /// An affine on the output side is a linear recombination of the two
    /// axis polynomials plus a constant shift.
    pub fn compose_with_output(&self, affine: &AffineTransform) -> Self {
        let m = affine.linear().matrix();
        let t = affine.translation();
        let n = num_coeffs(self.degree);
        let mut x_out = vec![0.0; n];
        let mut y_out = vec![0.0; n];
        for k in 0..n {
            x_out[k] = m[(0, 0)] * self.x_coeffs[k] + m[(0, 1)] * self.y_coeffs[k];
            y_out[k] = m[(1, 0)] * self.x_coeffs[k] + m[(1, 1)] * self.y_coeffs[k];
        }
        x_out[0] += t.x;
        y_out[0] += t.y;
        Self {
            degree: self.degree,
            x_coeffs: x_out,
            y_coeffs: y_out,
        }
    }

    /// Re-pad to a higher degree (new coefficients are zero). Used by the
    /// SIP conversions, which always need the linear terms present.
    pub(crate) fn padded_to_degree(&self, degree: usize) -> Self {
        if degree <= self.degree {
            return self.clone();
        }
        let n = num_coeffs(degree);
        let mut x_coeffs = self.x_coeffs.clone();
        let mut y_coeffs = self.y_coeffs.clone();
        x_coeffs.resize(n, 0.0);
        y_coeffs.resize(n, 0.0);
        Self {
            degree,
            x_coeffs,
            y_coeffs,
        }
    }
}

/// A [`PolynomialTransform`] wrapped with input and output conditioning
/// affines: evaluation is `output(poly(input(p)))`.
///
/// The affines exist purely for numerical conditioning of high-degree fits;
/// collapsing them back into the polynomial via [`to_unscaled`]
/// (ScaledPolynomialTransform::to_unscaled) reproduces the same mathematical
/// mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledPolynomialTransform {
    poly: PolynomialTransform,
    input: AffineTransform,
    output: AffineTransform,
}

impl ScaledPolynomialTransform {
    pub fn new(poly: PolynomialTransform, input: AffineTransform, output: AffineTransform) -> Self {
        Self {
            poly,
            input,
            output,
        }
    }

    pub fn poly(&self) -> &PolynomialTransform {
        &self.poly
    }

    /// The conditioning affine applied before the polynomial.
    pub fn input_scaling(&self) -> &AffineTransform {
        &self.input
    }

    /// The conditioning affine applied after the polynomial.
    pub fn output_scaling(&self) -> &AffineTransform {
        &self.output
    }

    /// Evaluate: input affine, polynomial, output affine.
    pub fn apply(&self, p: Point2D) -> Point2D {
        self.output.apply(self.poly.apply(self.input.apply(p)))
    }

    /// Batch form of [`apply`](Self::apply), with the same contract as
    /// [`PolynomialTransform::apply_batch`].
    pub fn apply_batch(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        check_finite(points)?;
        Ok(map_batch(points, |p| self.apply(p)))
    }

    /// Collapse the conditioning affines into an equivalent raw polynomial.
    pub fn to_unscaled(&self) -> PolynomialTransform {
        self.poly
            .compose_with_input(&self.input)
            .compose_with_output(&self.output)
    }
}
