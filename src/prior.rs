//! The map between the unit hypercube the geometry works in and the prior
//! space the likelihood is evaluated in.

use std::fmt;

use ndarray::{Array1, ArrayView1};
use statrs::distribution::{ContinuousCDF, Uniform};

use crate::error::{Error, Result};

/// A univariate prior: the two operations nested sampling needs from it.
///
/// Blanket-implemented for every `statrs` continuous distribution, so
/// `Normal`, `Uniform`, `Beta`, ... box straight into a [`PriorSpace`].
pub trait Prior {
    /// Inverse CDF, mapping p in (0,1) into the prior's support.
    fn quantile(&self, p: f64) -> f64;

    /// CDF, mapping the support back to (0,1).
    fn cdf(&self, theta: f64) -> f64;
}

impl<D> Prior for D
where
    D: ContinuousCDF<f64, f64>,
{
    fn quantile(&self, p: f64) -> f64 {
        self.inverse_cdf(p)
    }

    fn cdf(&self, theta: f64) -> f64 {
        ContinuousCDF::cdf(self, theta)
    }
}

/// The product of d independent univariate priors.
pub struct PriorSpace {
    dists: Vec<Box<dyn Prior>>,
}

impl PriorSpace {
    pub fn new(dists: Vec<Box<dyn Prior>>) -> Result<PriorSpace> {
        if dists.is_empty() {
            return Err(Error::config("at least one prior distribution is required"));
        }
        Ok(PriorSpace { dists })
    }

    /// d independent Uniform(lo, hi) priors, the usual flat-box setup.
    pub fn uniform(ndim: usize, lo: f64, hi: f64) -> Result<PriorSpace> {
        let mut dists: Vec<Box<dyn Prior>> = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            let dist = Uniform::new(lo, hi).map_err(|e| Error::config(e.to_string()))?;
            dists.push(Box::new(dist));
        }
        PriorSpace::new(dists)
    }

    pub fn ndim(&self) -> usize {
        self.dists.len()
    }

    /// Componentwise inverse-CDF image of a unit-cube point.
    pub fn transform(&self, unit: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_iter(unit.iter().zip(&self.dists).map(|(u, d)| d.quantile(*u)))
    }

    /// Componentwise CDF image, back into the unit cube.
    pub fn to_unit(&self, theta: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_iter(theta.iter().zip(&self.dists).map(|(t, d)| d.cdf(*t)))
    }
}

impl fmt::Debug for PriorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorSpace")
            .field("ndim", &self.ndim())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use statrs::distribution::Normal;

    #[test]
    fn uniform_quantiles() {
        let space = PriorSpace::uniform(2, -5.0, 5.0).unwrap();
        let theta = space.transform(array![0.5, 0.75].view());
        assert_abs_diff_eq!(theta[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(theta[1], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn mixed_priors_roundtrip() {
        let dists: Vec<Box<dyn Prior>> = vec![
            Box::new(Uniform::new(0.0, 2.0).unwrap()),
            Box::new(Normal::new(1.0, 3.0).unwrap()),
        ];
        let space = PriorSpace::new(dists).unwrap();
        let unit = array![0.3, 0.9];
        let theta = space.transform(unit.view());
        let back = space.to_unit(theta.view());
        assert_abs_diff_eq!(back[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(back[1], 0.9, epsilon = 1e-9);
    }

    #[test]
    fn normal_median_is_mean() {
        let dists: Vec<Box<dyn Prior>> = vec![Box::new(Normal::new(-2.0, 0.5).unwrap())];
        let space = PriorSpace::new(dists).unwrap();
        let theta = space.transform(array![0.5].view());
        assert_abs_diff_eq!(theta[0], -2.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_prior_list_is_rejected() {
        assert!(PriorSpace::new(Vec::new()).is_err());
    }
}
