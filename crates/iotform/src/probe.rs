//! Existence checks.
//!
//! Remote APIs disagree on how "no such resource" is reported. Most fail
//! the describe call with a not-found fault; singleton configuration
//! resources instead answer with an all-default object. The strategy is
//! chosen per resource type with [`Resource::EXISTENCE`] and must not be
//! unified.
use crate::{Fault, Resource};

/// How the existence of a resource type is detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExistenceStrategy {
    /// Describe fails with [`Fault::NotFound`] when the resource is absent.
    NotFoundFault,
    /// Describe always succeeds; the resource exists when
    /// [`Resource::sentinel_present`] is true for the observed state.
    SentinelField,
}

/// Result of an existence probe.
#[derive(Clone, Debug, PartialEq)]
pub enum Existence<T> {
    Present(T),
    Absent,
}

impl<T> Existence<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Existence::Present(_))
    }
}

/// Probes the remote for the resource identified by `model`.
///
/// Faults other than the not-found case are returned as errors and are
/// never read as absence.
pub async fn probe<R: Resource>(model: &R, provider: &R::Provider) -> Result<Existence<R>, Fault> {
    log::debug!(
        "{} '{}': describe",
        R::TYPE_NAME,
        model.identifier().unwrap_or_default()
    );
    let observed = match R::EXISTENCE {
        ExistenceStrategy::NotFoundFault => match model.describe(provider).await {
            Ok(observed) => observed,
            Err(fault) if fault.is_not_found() => {
                log::debug!("  not found: {fault}");
                return Ok(Existence::Absent);
            }
            Err(fault) => return Err(fault),
        },
        ExistenceStrategy::SentinelField => {
            let observed = model.describe(provider).await?;
            if !observed.sentinel_present() {
                log::debug!("  sentinel field is empty");
                return Ok(Existence::Absent);
            }
            observed
        }
    };
    Ok(Existence::Present(observed))
}
