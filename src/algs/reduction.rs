//! Collective agreement on per-worker outcomes.

use crate::algs::communicator::Communicator;
use crate::poisson_error::{PoissonError, Result};

/// Turn a local outcome into a collective one.
///
/// Every worker contributes a failure flag to a max-reduction. If any worker
/// failed, all return an error: the failing worker its own, the others
/// [`PoissonError::PeerFailure`]. No worker proceeds past this point alone,
/// so none is left waiting in a later collective.
pub fn all_agree<C: Communicator, T>(comm: &C, phase: &'static str, local: Result<T>) -> Result<T> {
    let failed = if local.is_err() { 1.0 } else { 0.0 };
    let any_failed = comm.allreduce_max(failed)?;
    match local {
        Err(e) => {
            log::error!("rank {}: {phase} failed: {e}", comm.rank());
            Err(e)
        }
        Ok(_) if any_failed > 0.0 => Err(PoissonError::PeerFailure { phase }),
        Ok(v) => Ok(v),
    }
}
