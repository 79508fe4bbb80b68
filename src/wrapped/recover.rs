use log::trace;

use super::WrappedFuture;
use crate::error::{guarded, UnifiedError};

impl<T: Clone + 'static> WrappedFuture<T> {
    /// Recover from a rejection.
    ///
    /// `handler` receives the normalized error and its return value fulfils
    /// the result. A fulfilled value passes through untouched and `handler`
    /// never runs. A panic in `handler` rejects the result.
    pub fn catch(
        &self,
        handler: impl FnOnce(UnifiedError) -> T + 'static,
    ) -> WrappedFuture<T> {
        self.chain(move |outcome, resolver| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(failure) => {
                let error = UnifiedError::classify(&failure);
                trace!("catch: handling {error}");
                resolver.settle(guarded(move || handler(error)));
            }
        })
    }

    /// Run `side_effect` exactly once when this future settles, whatever the
    /// outcome.
    ///
    /// The result settles exactly like `self`, unless `side_effect` panics: the
    /// panic then replaces the original outcome as the result's rejection.
    pub fn finally(&self, side_effect: impl FnOnce() + 'static) -> WrappedFuture<T> {
        self.chain(move |outcome, resolver| match guarded(side_effect) {
            Ok(()) => resolver.settle(outcome),
            Err(failure) => {
                trace!("finally: side effect threw, discarding original outcome");
                resolver.reject(failure);
            }
        })
    }
}
