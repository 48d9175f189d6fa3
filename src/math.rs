//! Log-space accumulation and the small dense linear algebra the ellipsoid
//! geometry runs on. Matrices here are d x d with d the problem dimension,
//! so plain O(d^3) factorizations are all that is needed.

use ndarray::{Array1, Array2};
use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;
use statrs::function::gamma::ln_gamma;

/// log(exp(a) + exp(b)) without overflow.
pub fn logaddexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// log of a sum of exponentials over a slice.
pub fn logsumexp(xs: &[f64]) -> f64 {
    let hi = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if hi == f64::NEG_INFINITY {
        return hi;
    }
    hi + xs.iter().map(|x| (x - hi).exp()).sum::<f64>().ln()
}

/// Log-volume of the unit ball in `ndim` dimensions,
/// pi^(d/2) / Gamma(d/2 + 1).
pub fn nball_logvol(ndim: usize) -> f64 {
    let half = ndim as f64 / 2.0;
    half * std::f64::consts::PI.ln() - ln_gamma(half + 1.0)
}

/// Lower-triangular Cholesky factor L with A = L L^T, or None when A is not
/// positive definite.
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let d = a.nrows();
    let mut l = Array2::<f64>::zeros((d, d));
    for i in 0..d {
        for j in 0..=i {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(s > 0.0) || !s.is_finite() {
                    return None;
                }
                l[[i, j]] = s.sqrt();
            } else {
                l[[i, j]] = s / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Inverse of a lower-triangular matrix by forward substitution.
pub fn invert_lower(l: &Array2<f64>) -> Array2<f64> {
    let d = l.nrows();
    let mut inv = Array2::<f64>::zeros((d, d));
    for i in 0..d {
        inv[[i, i]] = 1.0 / l[[i, i]];
        for j in 0..i {
            let mut s = 0.0;
            for k in j..i {
                s += l[[i, k]] * inv[[k, j]];
            }
            inv[[i, j]] = -s / l[[i, i]];
        }
    }
    inv
}

/// Inverse of A = L L^T given its Cholesky factor: A^-1 = L^-T L^-1.
pub fn spd_inverse(chol: &Array2<f64>) -> Array2<f64> {
    let linv = invert_lower(chol);
    linv.t().dot(&linv)
}

/// Uniform draw from the surface of the unit sphere in `ndim` dimensions.
pub fn randsphere<R: Rng>(rng: &mut R, ndim: usize) -> Array1<f64> {
    let gauss = Normal::new(0.0, 1.0).unwrap();
    loop {
        let z: Array1<f64> = Array1::from_shape_fn(ndim, |_| gauss.sample(rng));
        let norm = z.dot(&z).sqrt();
        if norm > 0.0 && norm.is_finite() {
            return z / norm;
        }
    }
}

/// Uniform draw from the interior of the unit ball: a spherical direction
/// scaled by U^(1/d).
pub fn randball<R: Rng>(rng: &mut R, ndim: usize) -> Array1<f64> {
    let mut z = randsphere(rng, ndim);
    z *= rng.gen::<f64>().powf(1.0 / ndim as f64);
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn logaddexp_doubles() {
        assert_abs_diff_eq!(
            logaddexp(0.5_f64.ln(), 0.5_f64.ln()),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn logaddexp_neg_infinity() {
        assert_eq!(logaddexp(f64::NEG_INFINITY, -3.0), -3.0);
        assert_eq!(logaddexp(-3.0, f64::NEG_INFINITY), -3.0);
        assert_eq!(
            logaddexp(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn logsumexp_matches_direct_sum() {
        let xs: [f64; 3] = [-1.0, 0.0, 2.5];
        let direct: f64 = xs.iter().map(|x: &f64| x.exp()).sum();
        assert_abs_diff_eq!(logsumexp(&xs), direct.ln(), epsilon = 1e-12);
    }

    #[test]
    fn nball_volumes_closed_form() {
        assert_abs_diff_eq!(nball_logvol(1), 2.0_f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            nball_logvol(2),
            std::f64::consts::PI.ln(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            nball_logvol(3),
            (4.0 * std::f64::consts::PI / 3.0).ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn cholesky_reconstructs() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let back = l.dot(&l.t());
        let worst = (&back - &a).iter().map(|v| v.abs()).fold(0.0, f64::max);
        assert!(worst < 1e-12);
    }

    #[test]
    fn cholesky_rejects_singular() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(cholesky(&a).is_none());
    }

    #[test]
    fn spd_inverse_gives_identity() {
        let a = array![[2.0, 0.5, 0.0], [0.5, 1.5, 0.2], [0.0, 0.2, 1.0]];
        let l = cholesky(&a).unwrap();
        let inv = spd_inverse(&l);
        let eye = a.dot(&inv);
        let worst = (&eye - &Array2::<f64>::eye(3))
            .iter()
            .map(|v| v.abs())
            .fold(0.0, f64::max);
        assert!(worst < 1e-10);
    }

    #[test]
    fn ball_draws_stay_inside() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let z = randball(&mut rng, 4);
            assert!(z.dot(&z) <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn sphere_draws_are_normalized() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let z = randsphere(&mut rng, 3);
            assert_abs_diff_eq!(z.dot(&z), 1.0, epsilon = 1e-12);
        }
    }
}
