use log::trace;

use super::WrappedFuture;
use crate::{error::guarded, futures::promise::Settle};

impl<T: Clone + 'static> WrappedFuture<T> {
    /// Transform the fulfilled value with `f`.
    ///
    /// The result fulfils with whatever `f` returns, as-is. If `f` returns a
    /// `WrappedFuture` the result is a future of a future; use
    /// [WrappedFuture::then] to adopt it instead. A panic in `f` rejects the
    /// result. A rejection of `self` is passed through and `f` never runs.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> WrappedFuture<U> {
        self.chain(move |outcome, resolver| match outcome {
            Ok(value) => resolver.settle(guarded(move || f(value))),
            Err(failure) => resolver.reject(failure),
        })
    }

    /// Chain an asynchronous step.
    ///
    /// The result adopts the settlement of the future returned by `f`. Exactly
    /// one level is flattened: if that future itself fulfils with a
    /// `WrappedFuture`, the result fulfils with that inner handle. A panic in
    /// `f` rejects the result. A rejection of `self` is passed through and `f`
    /// never runs.
    pub fn then<U: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> WrappedFuture<U> + 'static,
    ) -> WrappedFuture<U> {
        self.chain(move |outcome, resolver| {
            let next = match outcome {
                Ok(value) => guarded(move || f(value)),
                Err(failure) => return resolver.reject(failure),
            };

            match next {
                Ok(next) => {
                    trace!("then: adopting returned future");
                    let on_reject = resolver.clone();
                    next.host.attach_on_settle(
                        move |value| resolver.resolve(value),
                        move |failure| on_reject.reject(failure),
                    );
                }
                Err(failure) => resolver.reject(failure),
            }
        })
    }
}
