//! The static nested-sampling driver: a fixed-size live set, a running
//! evidence/information accumulator, a bound refit schedule and a proposal
//! that replaces the worst live point each iteration.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bounds::{Bound, BoundKind};
use crate::error::{Error, Result};
use crate::math::logaddexp;
use crate::prior::PriorSpace;
use crate::proposal::{Draw, Proposal};


/// Runtime options. `npoints` is the live-set size N; everything else has a
/// serviceable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// number of live points
    pub npoints: usize,
    /// bound maintained around the live set
    pub bounds: BoundKind,
    /// replacement strategy
    pub proposal: Proposal,
    /// volume inflation applied after every bound fit
    pub enlarge: f64,
    /// iterations between bound refits; defaults to round(0.6 N)
    pub update_interval: Option<usize>,
    /// likelihood calls before the configured bound/proposal pair activates
    pub min_ncall: Option<usize>,
    /// sampling efficiency (iterations per call) at or below which the
    /// configured bound/proposal pair activates
    pub min_eff: Option<f64>,
    /// rejection budget for the uniform proposal; unlimited when unset
    pub max_rejects: Option<usize>,
    /// rng seed; drawn from the OS when unset
    pub seed: Option<u64>,
}

impl Options {
    pub fn new(npoints: usize) -> Options {
        Options {
            npoints,
            bounds: BoundKind::default(),
            proposal: Proposal::default(),
            enlarge: 1.25,
            update_interval: None,
            min_ncall: None,
            min_eff: None,
            max_rejects: None,
            seed: None,
        }
    }
}

/// One emitted draw: the evicted live point together with the prior mass and
/// weight assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub theta: Array1<f64>,
    pub unit: Array1<f64>,
    pub logl: f64,
    pub logvol: f64,
    pub logwt: f64,
}

/// Final summary of a run: evidence, information, the full weighted chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub logz: f64,
    pub logzerr: f64,
    pub h: f64,
    pub niter: usize,
    pub ncall: usize,
    pub samples: Vec<Sample>,
    pub weights: Vec<f64>,
}

// finite stand-in for log(0): keeps exp(logz - logz') * (h + logz) out of
// 0 * inf territory on the first moment update
const LOGZ_FLOOR: f64 = -1e300;

/// The static nested sampler. Owns the live set, the random source, the
/// current bound and proposal, and the running moments.
pub struct NestedSampler<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    loglike: F,
    space: PriorSpace,
    rng: StdRng,
    // configuration
    npoints: usize,
    bound_kind: BoundKind,
    enlarge: f64,
    update_interval: usize,
    min_ncall: Option<usize>,
    min_eff: Option<f64>,
    max_rejects: Option<usize>,
    // live set, one point per row
    unit: Array2<f64>,
    theta: Array2<f64>,
    logl: Array1<f64>,
    // geometry
    bound: Bound,
    proposal: Proposal,
    warming_up: bool,
    // running statistics
    logz: f64,
    h: f64,
    logvol: f64,
    last_logwt: f64,
    ndecl: usize,
    niter: usize,
    ncall: usize,
    samples: Vec<Sample>,
    warned_degenerate: bool,
}

impl<F> NestedSampler<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    /// Validate the configuration, draw N live points from the unit cube,
    /// map them through the priors and fit the initial bound.
    pub fn new(mut loglike: F, space: PriorSpace, options: Options) -> Result<Self> {
        let ndim = space.ndim();
        let n = options.npoints;
        if n < 2 {
            return Err(Error::config("at least 2 live points are required"));
        }
        if options.enlarge < 1.0 {
            return Err(Error::config("enlargement factor must be at least 1"));
        }
        if matches!(options.update_interval, Some(0)) {
            return Err(Error::config("update interval must be positive"));
        }
        if let Some(eff) = options.min_eff {
            if !(eff > 0.0 && eff <= 1.0) {
                return Err(Error::config("min_eff must lie in (0, 1]"));
            }
        }
        match &options.proposal {
            Proposal::RWalk { walks: 0, .. } => {
                return Err(Error::config("random walk needs at least one step"));
            }
            Proposal::RSlice { slices: 0, .. } | Proposal::Slice { slices: 0 } => {
                return Err(Error::config("slice sampling needs at least one pass"));
            }
            Proposal::Slice { .. } | Proposal::RSlice { .. }
                if options.bounds == BoundKind::UnitCube =>
            {
                return Err(Error::config(
                    "slice proposals need an ellipsoidal bound for their widths",
                ));
            }
            _ => {}
        }
        if n < 2 * ndim {
            warn!(
                "{} live points for {} dimensions; at least {} are recommended",
                n,
                ndim,
                2 * ndim
            );
        }

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let unit = Array2::from_shape_fn((n, ndim), |_| rng.gen::<f64>());
        let mut theta = Array2::<f64>::zeros((n, ndim));
        let mut logl = Array1::<f64>::zeros(n);
        for j in 0..n {
            let th = space.transform(unit.row(j));
            logl[j] = loglike(&th);
            theta.row_mut(j).assign(&th);
        }

        let warming_up = options.min_ncall.is_some() || options.min_eff.is_some();
        let bound = if warming_up || options.bounds == BoundKind::UnitCube {
            Bound::unit_cube(ndim)
        } else {
            let mut bound = Bound::fit(options.bounds, unit.view(), 1.0 / n as f64)?;
            bound.enlarge(options.enlarge);
            bound
        };
        let update_interval = options
            .update_interval
            .unwrap_or_else(|| (0.6 * n as f64).round().max(1.0) as usize);

        Ok(NestedSampler {
            loglike,
            space,
            rng,
            npoints: n,
            bound_kind: options.bounds,
            enlarge: options.enlarge,
            update_interval,
            min_ncall: options.min_ncall,
            min_eff: options.min_eff,
            max_rejects: options.max_rejects,
            unit,
            theta,
            logl,
            bound,
            proposal: options.proposal,
            warming_up,
            logz: LOGZ_FLOOR,
            h: 0.0,
            logvol: 0.0,
            last_logwt: f64::NEG_INFINITY,
            ndecl: 0,
            niter: 0,
            ncall: n,
            samples: Vec::new(),
            warned_degenerate: false,
        })
    }

    /// One iteration: harvest the worst live point, fold it into the
    /// evidence moments, refit the bound on schedule and draw a replacement
    /// above the threshold it set.
    pub fn step(&mut self) -> Result<Sample> {
        self.niter += 1;
        let n = self.npoints as f64;

        let worst = self
            .logl
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| OrderedFloat(**l))
            .map(|(j, _)| j)
            .unwrap_or(0);
        let logl_star = self.logl[worst];

        // expected log shrinkage of the remaining prior mass
        self.logvol = if self.niter == 1 {
            (-(-1.0 / n).exp()).ln_1p()
        } else {
            self.logvol - 1.0 / n
        };
        let logwt = self.logvol + logl_star;
        self.accumulate(logl_star, logwt);

        if logwt < self.last_logwt {
            self.ndecl += 1;
        } else {
            self.ndecl = 0;
        }
        self.last_logwt = logwt;

        let sample = Sample {
            theta: self.theta.row(worst).to_owned(),
            unit: self.unit.row(worst).to_owned(),
            logl: logl_star,
            logvol: self.logvol,
            logwt,
        };

        self.maybe_update_bound();

        let start = self.other_live_point(worst);
        let draw = self.replacement(logl_star, start.view())?;
        self.ncall += draw.ncall;
        self.unit.row_mut(worst).assign(&draw.unit);
        self.theta.row_mut(worst).assign(&draw.theta);
        self.logl[worst] = draw.logl;

        self.samples.push(sample.clone());
        Ok(sample)
    }

    // log-sum-exp update of the evidence and information moments
    fn accumulate(&mut self, logl: f64, logwt: f64) {
        let logz_new = logaddexp(self.logz, logwt);
        let wt_term = if logwt == f64::NEG_INFINITY {
            0.0
        } else {
            (logwt - logz_new).exp() * logl
        };
        self.h = wt_term + (self.logz - logz_new).exp() * (self.h + self.logz) - logz_new;
        self.logz = logz_new;
    }

    fn maybe_update_bound(&mut self) {
        if self.warming_up {
            let eff = self.niter as f64 / self.ncall.max(1) as f64;
            let calls_ok = self.min_ncall.map_or(true, |m| self.ncall >= m);
            let eff_ok = self.min_eff.map_or(true, |m| eff <= m);
            if calls_ok && eff_ok {
                self.warming_up = false;
                debug!(
                    "activating {:?} bound after {} calls (efficiency {:.3})",
                    self.bound_kind, self.ncall, eff
                );
                self.refit_bound();
            }
        } else if self.bound_kind != BoundKind::UnitCube
            && self.niter % self.update_interval == 0
        {
            self.refit_bound();
        }
    }

    fn refit_bound(&mut self) {
        let n = self.npoints as f64;
        let pointvol = (-((self.niter - 1) as f64) / n).exp() / n;
        match Bound::fit(self.bound_kind, self.unit.view(), pointvol) {
            Ok(mut bound) => {
                bound.enlarge(self.enlarge);
                debug!(
                    "iteration {}: refit bound with {} ellipsoid(s), log-volume {:.3}",
                    self.niter,
                    bound.nells(),
                    bound.logvol()
                );
                self.bound = bound;
            }
            Err(_) => {
                // keep sampling from the previous bound for this interval
                if !self.warned_degenerate {
                    warn!(
                        "iteration {}: degenerate bound fit, keeping the previous bound",
                        self.niter
                    );
                    self.warned_degenerate = true;
                }
            }
        }
    }

    // a random live point other than the one being replaced, to seed walks
    fn other_live_point(&mut self, worst: usize) -> Array1<f64> {
        let n = self.npoints;
        let mut k = self.rng.gen_range(0..n);
        while n > 1 && k == worst {
            k = self.rng.gen_range(0..n);
        }
        self.unit.row(k).to_owned()
    }

    fn replacement(&mut self, logl_star: f64, start: ArrayView1<f64>) -> Result<Draw> {
        let result = if self.warming_up {
            let mut uniform = Proposal::Uniform;
            uniform.propose(
                &mut self.rng,
                &self.bound,
                &self.space,
                logl_star,
                start,
                &mut self.loglike,
                self.max_rejects,
            )
        } else {
            self.proposal.propose(
                &mut self.rng,
                &self.bound,
                &self.space,
                logl_star,
                start,
                &mut self.loglike,
                self.max_rejects,
            )
        };
        result.map_err(|err| match err {
            Error::StuckProposal { logl_star, .. } => Error::StuckProposal {
                logl_star,
                iteration: self.niter,
            },
            other => other,
        })
    }

    /// Upper bound on the log-evidence still held by the live set, relative
    /// to what has been accumulated so far.
    pub fn dlogz_remaining(&self) -> f64 {
        let n = self.npoints as f64;
        let max_logl = self.logl.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let logz_remain = max_logl - self.niter.saturating_sub(1) as f64 / n;
        logaddexp(self.logz, logz_remain) - self.logz
    }

    /// Stop when the fractional remaining evidence drops below `tau`.
    pub fn dlogz_convergence(&self, tau: f64) -> bool {
        self.dlogz_remaining() < tau
    }

    /// Stop after a long run of declining weights. The default factor of 1
    /// is deliberately lax.
    pub fn decline_convergence(&self, factor: f64) -> bool {
        self.ndecl as f64 > factor * self.niter as f64
    }

    /// Sweep the remaining live points into the evidence sum, assigning each
    /// an equal share of the residual prior mass, and package the run.
    pub fn finalize(mut self) -> Results {
        let n = self.npoints as f64;
        let logvol_end = -(self.niter as f64) / n - n.ln();
        for j in 0..self.npoints {
            let logl_j = self.logl[j];
            let logwt = logvol_end + logl_j;
            self.accumulate(logl_j, logwt);
            self.samples.push(Sample {
                theta: self.theta.row(j).to_owned(),
                unit: self.unit.row(j).to_owned(),
                logl: logl_j,
                logvol: logvol_end,
                logwt,
            });
        }

        if self.h < 0.0 {
            if self.h < -f64::EPSILON.sqrt() {
                warn!(
                    "information H = {:.3e} is negative beyond float tolerance",
                    self.h
                );
            }
            self.h = 0.0;
        }

        let logz = self.logz;
        let mut weights: Vec<f64> = self
            .samples
            .iter()
            .map(|s| (s.logwt - logz).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        let tolerance = if self.h > 0.0 {
            3.0 * (self.h / n).sqrt()
        } else {
            1e-3
        };
        if (total - 1.0).abs() > tolerance {
            warn!(
                "sample weights sum to {:.6}, outside tolerance {:.2e}",
                total, tolerance
            );
        }
        if total > 0.0 {
            weights.iter_mut().for_each(|w| *w /= total);
        }

        Results {
            logz,
            logzerr: (self.h / n).sqrt(),
            h: self.h,
            niter: self.niter,
            ncall: self.ncall,
            samples: self.samples,
            weights,
        }
    }

    /// Step until the remaining-evidence estimate drops below `dlogz`, then
    /// finalize. The step/predicate surface stays public for callers that
    /// want their own loop or stop rule.
    pub fn run(mut self, dlogz: f64) -> Result<Results> {
        while !self.dlogz_convergence(dlogz) {
            self.step()?;
        }
        Ok(self.finalize())
    }

    pub fn logz(&self) -> f64 {
        self.logz
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn niter(&self) -> usize {
        self.niter
    }

    pub fn ncall(&self) -> usize {
        self.ncall
    }

    pub fn ndim(&self) -> usize {
        self.space.ndim()
    }

    pub fn npoints(&self) -> usize {
        self.npoints
    }

    pub fn live_unit(&self) -> &Array2<f64> {
        &self.unit
    }

    pub fn live_theta(&self) -> &Array2<f64> {
        &self.theta
    }

    pub fn live_logl(&self) -> &Array1<f64> {
        &self.logl
    }
}
