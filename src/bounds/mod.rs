//! Geometric envelopes around the live set, all in unit-cube space. The
//! driver only ever touches the four-operation surface (fit, sample,
//! contains, volume) plus the enlargement knob.

mod ellipsoid;
mod kmeans;

pub use ellipsoid::Ellipsoid;

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::logsumexp;

/// Which bound the sampler maintains. `UnitCube` turns bounding off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    UnitCube,
    Ellipsoid,
    MultiEllipsoid,
}

impl Default for BoundKind {
    fn default() -> Self {
        BoundKind::Ellipsoid
    }
}

/// A fitted bound. The driver never branches on the concrete variant beyond
/// the operations below.
#[derive(Debug, Clone)]
pub enum Bound {
    UnitCube { ndim: usize },
    Ellipsoid(Ellipsoid),
    MultiEllipsoid(Vec<Ellipsoid>),
}

impl Bound {
    pub fn unit_cube(ndim: usize) -> Bound {
        Bound::UnitCube { ndim }
    }

    /// Fit a bound of the requested kind around `points` (one row per
    /// point), where `pointvol` is the expected prior volume per point.
    pub fn fit(kind: BoundKind, points: ArrayView2<f64>, pointvol: f64) -> Result<Bound> {
        match kind {
            BoundKind::UnitCube => Ok(Bound::UnitCube {
                ndim: points.ncols(),
            }),
            BoundKind::Ellipsoid => Ok(Bound::Ellipsoid(Ellipsoid::fit(points, pointvol)?)),
            BoundKind::MultiEllipsoid => {
                let depth = (points.nrows() as f64).log2().ceil().max(1.0) as usize;
                Ok(Bound::MultiEllipsoid(fit_multi(points, pointvol, depth)?))
            }
        }
    }

    pub fn enlarge(&mut self, factor: f64) {
        match self {
            Bound::UnitCube { .. } => {}
            Bound::Ellipsoid(ell) => ell.enlarge(factor),
            Bound::MultiEllipsoid(ells) => ells.iter_mut().for_each(|e| e.enlarge(factor)),
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Array1<f64> {
        match self {
            Bound::UnitCube { ndim } => Array1::from_shape_fn(*ndim, |_| rng.gen::<f64>()),
            Bound::Ellipsoid(ell) => ell.sample(rng),
            Bound::MultiEllipsoid(ells) => sample_multi(ells, rng),
        }
    }

    pub fn contains(&self, x: ArrayView1<f64>) -> bool {
        match self {
            Bound::UnitCube { .. } => x.iter().all(|&u| u > 0.0 && u < 1.0),
            Bound::Ellipsoid(ell) => ell.contains(x),
            Bound::MultiEllipsoid(ells) => ells.iter().any(|e| e.contains(x)),
        }
    }

    /// Log-volume; for a union of ellipsoids overlap is not subtracted.
    pub fn logvol(&self) -> f64 {
        match self {
            Bound::UnitCube { .. } => 0.0,
            Bound::Ellipsoid(ell) => ell.logvol(),
            Bound::MultiEllipsoid(ells) => {
                let vols: Vec<f64> = ells.iter().map(Ellipsoid::logvol).collect();
                logsumexp(&vols)
            }
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            Bound::UnitCube { ndim } => *ndim,
            Bound::Ellipsoid(ell) => ell.ndim(),
            Bound::MultiEllipsoid(ells) => ells.first().map_or(0, Ellipsoid::ndim),
        }
    }

    /// Number of member ellipsoids; 1 for the unit cube.
    pub fn nells(&self) -> usize {
        match self {
            Bound::MultiEllipsoid(ells) => ells.len(),
            _ => 1,
        }
    }

    /// The ellipsoid whose shape local moves around `at` should follow.
    pub(crate) fn local_ellipsoid(&self, at: ArrayView1<f64>) -> Option<&Ellipsoid> {
        match self {
            Bound::UnitCube { .. } => None,
            Bound::Ellipsoid(ell) => Some(ell),
            Bound::MultiEllipsoid(ells) => {
                ells.iter().find(|e| e.contains(at)).or_else(|| ells.first())
            }
        }
    }

    /// Step kernel for random walks: a draw from the local shape, or a plain
    /// unit-ball step when no ellipsoid is available.
    pub(crate) fn draw_offset<R: Rng>(&self, rng: &mut R, at: ArrayView1<f64>) -> Array1<f64> {
        match self.local_ellipsoid(at) {
            Some(ell) => ell.draw_offset(rng),
            None => crate::math::randball(rng, self.ndim()),
        }
    }
}

/// Recursive 2-means refinement: keep splitting while the single-ellipsoid
/// fit volume runs well past the prior mass the points account for.
fn fit_multi(points: ArrayView2<f64>, pointvol: f64, depth: usize) -> Result<Vec<Ellipsoid>> {
    let n = points.nrows();
    let ndim = points.ncols();
    let parent = Ellipsoid::fit(points, pointvol)?;

    let roomy = pointvol <= 0.0 || parent.logvol() > (2.0 * n as f64 * pointvol).ln();
    if depth == 0 || n < 2 * (ndim + 1) || !roomy {
        return Ok(vec![parent]);
    }
    let (left, right) = kmeans::split2(points);
    // each child needs enough points for a full-rank covariance
    if left.len() <= ndim || right.len() <= ndim {
        return Ok(vec![parent]);
    }
    let lpoints = points.select(Axis(0), &left);
    let rpoints = points.select(Axis(0), &right);
    let children = match (
        fit_multi(lpoints.view(), pointvol, depth - 1),
        fit_multi(rpoints.view(), pointvol, depth - 1),
    ) {
        (Ok(mut a), Ok(b)) => {
            a.extend(b);
            a
        }
        _ => return Ok(vec![parent]),
    };
    // reject only when the children together outgrow the parent
    let child_vols: Vec<f64> = children.iter().map(Ellipsoid::logvol).collect();
    if logsumexp(&child_vols) <= parent.logvol() {
        Ok(children)
    } else {
        Ok(vec![parent])
    }
}

/// Volume-weighted draw from a union of ellipsoids, with the usual 1/q
/// overlap correction where q counts the members containing the draw.
fn sample_multi<R: Rng>(ells: &[Ellipsoid], rng: &mut R) -> Array1<f64> {
    if ells.len() == 1 {
        return ells[0].sample(rng);
    }
    let logvols: Vec<f64> = ells.iter().map(Ellipsoid::logvol).collect();
    let total = logsumexp(&logvols);
    loop {
        let mut r = rng.gen::<f64>();
        let mut pick = ells.len() - 1;
        for (i, lv) in logvols.iter().enumerate() {
            let p = (lv - total).exp();
            if r < p {
                pick = i;
                break;
            }
            r -= p;
        }
        let x = ells[pick].sample(rng);
        let q = ells.iter().filter(|e| e.contains(x.view())).count().max(1);
        if q == 1 || rng.gen::<f64>() < 1.0 / q as f64 {
            return x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit_blobs(n_each: usize) -> Array2<f64> {
        // two tight clusters inside the unit square
        Array2::from_shape_fn((2 * n_each, 2), |(i, j)| {
            let jitter = ((i * 11 + j * 5) % 17) as f64 / 17.0 * 0.05;
            if i < n_each {
                0.15 + jitter
            } else {
                0.8 + jitter
            }
        })
    }

    #[test]
    fn unit_cube_operations() {
        let mut rng = StdRng::seed_from_u64(21);
        let cube = Bound::unit_cube(3);
        assert_eq!(cube.logvol(), 0.0);
        assert_eq!(cube.nells(), 1);
        for _ in 0..100 {
            let x = cube.sample(&mut rng);
            assert!(cube.contains(x.view()));
        }
    }

    #[test]
    fn fitting_unit_cube_kind_is_a_noop() {
        let points = unit_blobs(10);
        let bound = Bound::fit(BoundKind::UnitCube, points.view(), 0.01).unwrap();
        assert!(matches!(bound, Bound::UnitCube { ndim: 2 }));
    }

    #[test]
    fn single_ellipsoid_covers_points() {
        let points = unit_blobs(10);
        let bound = Bound::fit(BoundKind::Ellipsoid, points.view(), 1e-4).unwrap();
        for row in points.rows() {
            assert!(bound.contains(row));
        }
    }

    #[test]
    fn multi_ellipsoid_splits_two_clusters() {
        let points = unit_blobs(20);
        // tiny pointvol so the loose single-ellipsoid fit looks oversized
        let bound = Bound::fit(BoundKind::MultiEllipsoid, points.view(), 1e-8).unwrap();
        assert!(bound.nells() >= 2);
        for row in points.rows() {
            assert!(bound.contains(row));
        }
    }

    #[test]
    fn multi_ellipsoid_samples_stay_in_union() {
        let mut rng = StdRng::seed_from_u64(22);
        let points = unit_blobs(20);
        let mut bound = Bound::fit(BoundKind::MultiEllipsoid, points.view(), 1e-8).unwrap();
        bound.enlarge(1.25);
        for _ in 0..300 {
            let x = bound.sample(&mut rng);
            assert!(bound.contains(x.view()));
        }
    }

    #[test]
    fn compact_cluster_stays_single() {
        // one blob whose fit volume matches its prior mass: no split
        let points = Array2::from_shape_fn((30, 2), |(i, j)| {
            0.5 + ((i * 13 + j * 7) % 19) as f64 / 19.0 * 0.1
        });
        let pointvol = 0.01 / 30.0 * 40.0; // comfortably above the fit volume
        let bound = Bound::fit(BoundKind::MultiEllipsoid, points.view(), pointvol).unwrap();
        assert_eq!(bound.nells(), 1);
    }
}
