//! Strategies for drawing a replacement live point above the likelihood
//! threshold. Every strategy works in unit-cube space, leans on the current
//! bound for its geometry, and reports how many likelihood calls it spent.

use ndarray::{Array1, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bounds::Bound;
use crate::error::{Error, Result};
use crate::math::randsphere;
use crate::prior::PriorSpace;

/// Default number of walk steps per replacement draw.
pub const DEFAULT_WALKS: usize = 25;
/// Default number of slice passes per replacement draw.
pub const DEFAULT_SLICES: usize = 5;
// floor for the adaptive slice scale: keeps the bracket expansion bounded
// when contractions dominate call after call
const MIN_SLICE_SCALE: f64 = 1e-5;

/// How replacement points are proposed. The scale fields adapt in place
/// between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Proposal {
    /// Rejection sampling straight from the bound.
    Uniform,
    /// Likelihood-constrained random walk seeded at another live point.
    RWalk { walks: usize, scale: f64 },
    /// Slice sampling along directions drawn from the bound's shape.
    RSlice { slices: usize, scale: f64 },
    /// Axis-aligned slice sampling with widths from the bound's extents.
    Slice { slices: usize },
}

impl Default for Proposal {
    fn default() -> Self {
        Proposal::Uniform
    }
}

impl Proposal {
    pub fn rwalk() -> Proposal {
        Proposal::RWalk {
            walks: DEFAULT_WALKS,
            scale: 1.0,
        }
    }

    pub fn rslice() -> Proposal {
        Proposal::RSlice {
            slices: DEFAULT_SLICES,
            scale: 1.0,
        }
    }

    pub fn slice() -> Proposal {
        Proposal::Slice {
            slices: DEFAULT_SLICES,
        }
    }

    /// Draw a point with log-likelihood at or above `logl_star`. `start`
    /// must be a live point other than the one being replaced; rejection
    /// sampling ignores it.
    #[allow(clippy::too_many_arguments)]
    pub fn propose<R, F>(
        &mut self,
        rng: &mut R,
        bound: &Bound,
        space: &PriorSpace,
        logl_star: f64,
        start: ArrayView1<f64>,
        loglike: &mut F,
        max_rejects: Option<usize>,
    ) -> Result<Draw>
    where
        R: Rng,
        F: FnMut(&Array1<f64>) -> f64,
    {
        match self {
            Proposal::Uniform => uniform(rng, bound, space, logl_star, loglike, max_rejects),
            Proposal::RWalk { walks, scale } => Ok(rwalk(
                rng, bound, space, logl_star, start, loglike, *walks, scale,
            )),
            Proposal::RSlice { slices, scale } => Ok(rslice(
                rng, bound, space, logl_star, start, loglike, *slices, scale,
            )),
            Proposal::Slice { slices } => {
                Ok(slice_axes(rng, bound, space, logl_star, start, loglike, *slices))
            }
        }
    }
}

/// A freshly drawn live point and the likelihood spend it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub unit: Array1<f64>,
    pub theta: Array1<f64>,
    pub logl: f64,
    pub ncall: usize,
}

fn in_unit_cube(u: &Array1<f64>) -> bool {
    u.iter().all(|&v| v > 0.0 && v < 1.0)
}

fn uniform<R, F>(
    rng: &mut R,
    bound: &Bound,
    space: &PriorSpace,
    logl_star: f64,
    loglike: &mut F,
    max_rejects: Option<usize>,
) -> Result<Draw>
where
    R: Rng,
    F: FnMut(&Array1<f64>) -> f64,
{
    let mut ncall = 0usize;
    let mut rejects = 0usize;
    loop {
        let unit = bound.sample(rng);
        if in_unit_cube(&unit) {
            let theta = space.transform(unit.view());
            let logl = loglike(&theta);
            ncall += 1;
            if logl >= logl_star {
                return Ok(Draw {
                    unit,
                    theta,
                    logl,
                    ncall,
                });
            }
        }
        rejects += 1;
        if let Some(budget) = max_rejects {
            if rejects > budget {
                // the driver stamps the iteration before surfacing this
                return Err(Error::StuckProposal {
                    logl_star,
                    iteration: 0,
                });
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rwalk<R, F>(
    rng: &mut R,
    bound: &Bound,
    space: &PriorSpace,
    logl_star: f64,
    start: ArrayView1<f64>,
    loglike: &mut F,
    walks: usize,
    scale: &mut f64,
) -> Draw
where
    R: Rng,
    F: FnMut(&Array1<f64>) -> f64,
{
    let walks = walks.max(1);
    let mut unit = start.to_owned();
    let mut ncall = 0usize;
    loop {
        let mut naccept = 0usize;
        let mut accepted: Option<(Array1<f64>, f64)> = None;
        for _ in 0..walks {
            let offset = bound.draw_offset(rng, unit.view());
            let trial: Array1<f64> = &unit + &(offset * *scale);
            if !in_unit_cube(&trial) {
                continue;
            }
            let theta = space.transform(trial.view());
            let logl = loglike(&theta);
            ncall += 1;
            if logl >= logl_star {
                unit = trial;
                accepted = Some((theta, logl));
                naccept += 1;
            }
        }
        // steer toward a 50% acceptance ratio
        let facc = naccept as f64 / walks as f64;
        *scale *= ((facc - 0.5) / naccept.max(1) as f64).exp();
        if let Some((theta, logl)) = accepted {
            return Draw {
                unit,
                theta,
                logl,
                ncall,
            };
        }
    }
}

// evaluate the likelihood with coordinate k of `u` replaced by t; out-of-cube
// probes are free and count as -inf
fn probe_axis<F>(
    space: &PriorSpace,
    loglike: &mut F,
    u: &Array1<f64>,
    k: usize,
    t: f64,
    ncall: &mut usize,
) -> (f64, Option<(Array1<f64>, Array1<f64>)>)
where
    F: FnMut(&Array1<f64>) -> f64,
{
    if t <= 0.0 || t >= 1.0 {
        return (f64::NEG_INFINITY, None);
    }
    let mut trial = u.clone();
    trial[k] = t;
    let theta = space.transform(trial.view());
    let logl = loglike(&theta);
    *ncall += 1;
    (logl, Some((trial, theta)))
}

fn slice_axes<R, F>(
    rng: &mut R,
    bound: &Bound,
    space: &PriorSpace,
    logl_star: f64,
    start: ArrayView1<f64>,
    loglike: &mut F,
    slices: usize,
) -> Draw
where
    R: Rng,
    F: FnMut(&Array1<f64>) -> f64,
{
    let ndim = space.ndim();
    let mut unit = start.to_owned();
    let mut out: Option<(Array1<f64>, f64)> = None;
    let mut ncall = 0usize;
    let mut axes: Vec<usize> = (0..ndim).collect();

    for _ in 0..slices.max(1) {
        axes.shuffle(rng);
        for &k in &axes {
            let width = bound
                .local_ellipsoid(unit.view())
                .map(|e| e.axis_extent(k))
                .unwrap_or(1.0);

            // random bracket of one width around the current point
            let mut left = unit[k] - width * rng.gen::<f64>();
            let mut right = left + width;
            // step out until both edges drop below the threshold
            loop {
                let (logl, _) = probe_axis(space, loglike, &unit, k, left, &mut ncall);
                if logl < logl_star {
                    break;
                }
                left -= width;
            }
            loop {
                let (logl, _) = probe_axis(space, loglike, &unit, k, right, &mut ncall);
                if logl < logl_star {
                    break;
                }
                right += width;
            }
            // shrink toward the current point until a draw lands inside
            loop {
                let t = left + rng.gen::<f64>() * (right - left);
                let (logl, point) = probe_axis(space, loglike, &unit, k, t, &mut ncall);
                if logl >= logl_star {
                    if let Some((trial, theta)) = point {
                        unit = trial;
                        out = Some((theta, logl));
                    }
                    break;
                }
                if t < unit[k] {
                    left = t;
                } else {
                    right = t;
                }
            }
        }
    }

    let (theta, logl) = match out {
        Some(v) => v,
        None => {
            let theta = space.transform(unit.view());
            let logl = loglike(&theta);
            ncall += 1;
            (theta, logl)
        }
    };
    Draw {
        unit,
        theta,
        logl,
        ncall,
    }
}

// likelihood along u + t * dir, -inf outside the cube
fn probe_dir<F>(
    space: &PriorSpace,
    loglike: &mut F,
    u: &Array1<f64>,
    dir: &Array1<f64>,
    t: f64,
    ncall: &mut usize,
) -> (f64, Option<(Array1<f64>, Array1<f64>)>)
where
    F: FnMut(&Array1<f64>) -> f64,
{
    let trial: Array1<f64> = u + &(dir * t);
    if !in_unit_cube(&trial) {
        return (f64::NEG_INFINITY, None);
    }
    let theta = space.transform(trial.view());
    let logl = loglike(&theta);
    *ncall += 1;
    (logl, Some((trial, theta)))
}

#[allow(clippy::too_many_arguments)]
fn rslice<R, F>(
    rng: &mut R,
    bound: &Bound,
    space: &PriorSpace,
    logl_star: f64,
    start: ArrayView1<f64>,
    loglike: &mut F,
    slices: usize,
    scale: &mut f64,
) -> Draw
where
    R: Rng,
    F: FnMut(&Array1<f64>) -> f64,
{
    let ndim = space.ndim();
    let mut unit = start.to_owned();
    let mut out: Option<(Array1<f64>, f64)> = None;
    let mut ncall = 0usize;
    let mut nexpand = 0usize;
    let mut ncontract = 0usize;
    *scale = scale.max(MIN_SLICE_SCALE);

    for _ in 0..slices.max(1) {
        let dir: Array1<f64> = match bound.local_ellipsoid(unit.view()) {
            Some(ell) => ell.draw_direction(rng),
            None => randsphere(rng, ndim),
        } * *scale;

        let mut tleft = -rng.gen::<f64>();
        let mut tright = tleft + 1.0;
        loop {
            let (logl, _) = probe_dir(space, loglike, &unit, &dir, tleft, &mut ncall);
            if logl < logl_star {
                break;
            }
            tleft -= 1.0;
            nexpand += 1;
        }
        loop {
            let (logl, _) = probe_dir(space, loglike, &unit, &dir, tright, &mut ncall);
            if logl < logl_star {
                break;
            }
            tright += 1.0;
            nexpand += 1;
        }
        loop {
            let t = tleft + rng.gen::<f64>() * (tright - tleft);
            let (logl, point) = probe_dir(space, loglike, &unit, &dir, t, &mut ncall);
            if logl >= logl_star {
                if let Some((trial, theta)) = point {
                    unit = trial;
                    out = Some((theta, logl));
                }
                break;
            }
            if t < 0.0 {
                tleft = t;
            } else {
                tright = t;
            }
            ncontract += 1;
        }
    }

    // widen when the bracket keeps stepping out, tighten when shrinks dominate
    if ncontract > 0 {
        *scale = (*scale * nexpand.max(1) as f64 / (2.0 * ncontract as f64))
            .max(MIN_SLICE_SCALE);
    }

    let (theta, logl) = match out {
        Some(v) => v,
        None => {
            let theta = space.transform(unit.view());
            let logl = loglike(&theta);
            ncall += 1;
            (theta, logl)
        }
    };
    Draw {
        unit,
        theta,
        logl,
        ncall,
    }
}
