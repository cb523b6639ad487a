//! The limiter capability shared by every admission discipline.

use std::future::Future;

use crate::Acquire;

/// Attempts admission for one protected resource and reports the outcome.
///
/// Both operations are total: store faults are logged and surface as
/// [`Acquire::Exception`], never as errors.
pub trait Limiter: Send + Sync {
    /// Tries to take a permit.
    fn try_acquire(&self) -> impl Future<Output = Acquire> + Send;

    /// Gives a permit back. Disciplines without a release do nothing.
    fn release(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
