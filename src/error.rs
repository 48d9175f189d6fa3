use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong inside the sampler itself. Failures in
/// user-supplied likelihood code are never caught here; they unwind to the
/// caller untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected at construction: bad live-point count, an incompatible
    /// bound/proposal pair, a zero-length refit schedule.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// The bounding ellipsoid could not be fit because the point covariance
    /// stayed singular after diagonal regularization. During a run this is
    /// recovered by keeping the previous bound; it only surfaces when the
    /// very first fit fails.
    #[error("degenerate bounding ellipsoid: singular covariance after regularization")]
    DegenerateBound,

    /// The uniform proposal spent its whole rejection budget without finding
    /// a point above the likelihood threshold.
    #[error("proposal stuck at log-likelihood threshold {logl_star} (iteration {iteration})")]
    StuckProposal { logl_star: f64, iteration: usize },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Error {
        Error::Config {
            reason: reason.into(),
        }
    }
}
