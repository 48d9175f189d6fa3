//! Static nested sampling: estimate the Bayesian evidence
//! Z = integral of L(theta) pi(theta) d theta and produce weighted posterior
//! samples from a log-likelihood plus a list of independent univariate
//! priors.
//!
//! The sampler keeps N live points, repeatedly replaces the worst one with a
//! draw above its likelihood, and integrates the shells it peels off. The
//! geometry (ellipsoidal bounds, clustered unions of them) and the
//! replacement strategies (rejection, random walks, slice sampling) are both
//! pluggable through [`Options`].
//!
//! ```
//! use nested_sampler::{NestedSampler, Options, PriorSpace};
//!
//! let space = PriorSpace::uniform(2, -5.0, 5.0).unwrap();
//! let mut opts = Options::new(100);
//! opts.seed = Some(7);
//! let loglike = |theta: &ndarray::Array1<f64>| -0.5 * theta.dot(theta);
//! let sampler = NestedSampler::new(loglike, space, opts).unwrap();
//! let results = sampler.run(0.5).unwrap();
//! assert!(results.logz.is_finite());
//! ```

pub mod bounds;
pub mod error;
pub mod math;
pub mod prior;
pub mod proposal;
pub mod sampler;

pub use bounds::{Bound, BoundKind, Ellipsoid};
pub use error::{Error, Result};
pub use prior::{Prior, PriorSpace};
pub use proposal::{Draw, Proposal};
pub use sampler::{NestedSampler, Options, Results, Sample};
