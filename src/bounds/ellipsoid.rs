use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::error::{Error, Result};
use crate::math::{cholesky, nball_logvol, randball, randsphere, spd_inverse};

// attempts at bumping the covariance diagonal before declaring the fit
// degenerate
const REGULARIZE_TRIES: usize = 5;

/// A d-dimensional bounding ellipsoid { x : (x - c)^T A^-1 (x - c) <= 1 }.
///
/// The Cholesky factor (A = L L^T), the precision matrix A^-1 and the
/// log-volume are kept alongside A so sampling, containment tests and volume
/// lookups never refactorize.
#[derive(Debug, Clone)]
pub struct Ellipsoid {
    center: Array1<f64>,
    shape: Array2<f64>,     // A
    chol: Array2<f64>,      // L
    precision: Array2<f64>, // A^-1
    logvol: f64,
}

impl Ellipsoid {
    /// Bounding ellipsoid around `points` (one row per point).
    ///
    /// The sample covariance is scaled until the outermost point sits just
    /// inside the surface, then inflated so the volume is at least
    /// `n * pointvol`. A rank-deficient covariance gets a growing diagonal
    /// bump before the fit gives up.
    pub fn fit(points: ArrayView2<f64>, pointvol: f64) -> Result<Ellipsoid> {
        let n = points.nrows();
        let ndim = points.ncols();
        if n < 2 || ndim == 0 {
            return Err(Error::DegenerateBound);
        }
        let center = points.mean_axis(Axis(0)).ok_or(Error::DegenerateBound)?;
        let delta = &points - &center;
        let mut shape = delta.t().dot(&delta) / (n as f64 - 1.0);
        if shape.iter().any(|v| !v.is_finite()) {
            return Err(Error::DegenerateBound);
        }

        let diag_max = shape.diag().iter().cloned().fold(0.0, f64::max);
        let mut bump = if diag_max > 0.0 {
            diag_max * 1e-10
        } else {
            f64::EPSILON
        };
        let mut fitted = None;
        for _ in 0..=REGULARIZE_TRIES {
            match Ellipsoid::from_shape(center.clone(), shape.clone()) {
                Ok(e) => {
                    fitted = Some(e);
                    break;
                }
                Err(_) => {
                    for k in 0..ndim {
                        shape[[k, k]] += bump;
                    }
                    bump *= 10.0;
                }
            }
        }
        let mut ell = fitted.ok_or(Error::DegenerateBound)?;

        // scale A so the outermost fit point obeys the quadratic form with a
        // little room for round-off
        let fmax = delta
            .axis_iter(Axis(0))
            .map(|row| {
                let v = ell.precision.dot(&row);
                row.dot(&v)
            })
            .fold(0.0, f64::max);
        if fmax > 0.0 && fmax.is_finite() {
            ell.rescale(fmax / (1.0 - f64::EPSILON.sqrt()));
        }

        // never report less volume than the prior mass the points stand for
        if pointvol > 0.0 {
            let floor = (n as f64 * pointvol).ln();
            if ell.logvol < floor {
                ell.enlarge((floor - ell.logvol).exp());
            }
        }
        Ok(ell)
    }

    fn from_shape(center: Array1<f64>, shape: Array2<f64>) -> Result<Ellipsoid> {
        let ndim = shape.nrows();
        let chol = cholesky(&shape).ok_or(Error::DegenerateBound)?;
        let logdet = 2.0 * chol.diag().iter().map(|v| v.ln()).sum::<f64>();
        if !logdet.is_finite() {
            return Err(Error::DegenerateBound);
        }
        let precision = spd_inverse(&chol);
        let logvol = nball_logvol(ndim) + 0.5 * logdet;
        Ok(Ellipsoid {
            center,
            shape,
            chol,
            precision,
            logvol,
        })
    }

    // multiply A by k, keeping the cached factorization consistent
    fn rescale(&mut self, k: f64) {
        let ndim = self.ndim() as f64;
        self.shape *= k;
        self.chol *= k.sqrt();
        self.precision /= k;
        self.logvol += 0.5 * ndim * k.ln();
    }

    /// Inflate the volume by `factor`; A picks up factor^(2/d).
    pub fn enlarge(&mut self, factor: f64) {
        let ndim = self.ndim() as f64;
        self.rescale(factor.powf(2.0 / ndim));
    }

    /// Uniform draw from the interior: the image of a unit-ball point under
    /// the Cholesky factor, shifted to the center.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        &self.center + &self.chol.dot(&randball(rng, self.ndim()))
    }

    /// A draw from the ellipsoid's shape centered at the origin; the step
    /// kernel used by walk proposals.
    pub fn draw_offset<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        self.chol.dot(&randball(rng, self.ndim()))
    }

    /// A direction along the ellipsoid's axes, for slice proposals.
    pub fn draw_direction<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        self.chol.dot(&randsphere(rng, self.ndim()))
    }

    pub fn contains(&self, x: ArrayView1<f64>) -> bool {
        self.mahalanobis_sq(x) <= 1.0
    }

    fn mahalanobis_sq(&self, x: ArrayView1<f64>) -> f64 {
        let delta = &x - &self.center;
        delta.dot(&self.precision.dot(&delta))
    }

    /// Half-extent along coordinate axis `k`, sqrt(A_kk).
    pub fn axis_extent(&self, k: usize) -> f64 {
        self.shape[[k, k]].sqrt()
    }

    pub fn logvol(&self) -> f64 {
        self.logvol
    }

    pub fn center(&self) -> ArrayView1<f64> {
        self.center.view()
    }

    pub fn ndim(&self) -> usize {
        self.center.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gaussian_cloud(rng: &mut StdRng, n: usize, ndim: usize, spread: f64) -> Array2<f64> {
        use rand::distributions::Distribution;
        let gauss = statrs::distribution::Normal::new(0.0, spread).unwrap();
        Array2::from_shape_fn((n, ndim), |_| gauss.sample(rng))
    }

    #[test]
    fn fit_contains_every_point() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = gaussian_cloud(&mut rng, 60, 3, 1.0);
        let ell = Ellipsoid::fit(points.view(), 0.0).unwrap();
        for row in points.rows() {
            assert!(ell.contains(row));
        }
    }

    #[test]
    fn samples_from_enlarged_ellipsoid_are_contained() {
        let mut rng = StdRng::seed_from_u64(2);
        let points = gaussian_cloud(&mut rng, 40, 2, 0.5);
        let mut ell = Ellipsoid::fit(points.view(), 0.0).unwrap();
        ell.enlarge(1.25);
        for _ in 0..500 {
            let x = ell.sample(&mut rng);
            assert!(ell.contains(x.view()));
        }
    }

    #[test]
    fn refit_of_own_samples_is_volume_stable() {
        let mut rng = StdRng::seed_from_u64(3);
        let points = gaussian_cloud(&mut rng, 50, 2, 1.0);
        let ell = Ellipsoid::fit(points.view(), 0.0).unwrap();
        let mut draws = Array2::<f64>::zeros((500, 2));
        for mut row in draws.rows_mut() {
            row.assign(&ell.sample(&mut rng));
        }
        let refit = Ellipsoid::fit(draws.view(), 0.0).unwrap();
        assert!((refit.logvol() - ell.logvol()).abs() < 2.0_f64.ln());
    }

    #[test]
    fn enlarge_scales_log_volume() {
        let mut rng = StdRng::seed_from_u64(4);
        let points = gaussian_cloud(&mut rng, 30, 4, 1.0);
        let mut ell = Ellipsoid::fit(points.view(), 0.0).unwrap();
        let before = ell.logvol();
        ell.enlarge(2.0);
        assert_abs_diff_eq!(ell.logvol() - before, 2.0_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn volume_floor_is_enforced() {
        let mut rng = StdRng::seed_from_u64(5);
        let points = gaussian_cloud(&mut rng, 20, 2, 1e-4);
        let pointvol = 0.01;
        let ell = Ellipsoid::fit(points.view(), pointvol).unwrap();
        assert!(ell.logvol() >= (20.0 * pointvol).ln() - 1e-9);
    }

    #[test]
    fn identical_points_fall_back_to_a_tiny_ball() {
        let points = Array2::from_elem((10, 3), 0.5);
        let ell = Ellipsoid::fit(points.view(), 1e-6).unwrap();
        assert!(ell.contains(points.row(0)));
        assert!(ell.logvol().is_finite());
    }

    #[test]
    fn collinear_points_are_regularized() {
        // points on a line in 2d: singular covariance until the bump kicks in
        let points = Array2::from_shape_fn((12, 2), |(i, j)| {
            if j == 0 {
                i as f64 / 12.0
            } else {
                0.25
            }
        });
        let ell = Ellipsoid::fit(points.view(), 0.0).unwrap();
        for row in points.rows() {
            assert!(ell.contains(row));
        }
    }
}
