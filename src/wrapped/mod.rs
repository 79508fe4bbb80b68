//! Typed combinators over host promises.
//!
//! A [WrappedFuture] is a thin handle around exactly one host
//! [Promise]. It owns no state of its own: settlement lives in the promise,
//! and every combinator returns a new handle whose promise is settled by
//! continuations attached to its input(s). Continuations always run on a
//! later turn of the executor.
//!
//! Failures handed to user code are normalized into a [UnifiedError]; a panic
//! unwinding out of any callback becomes a rejection of the combinator's
//! result rather than escaping to the caller.
//!
//! | Operation | Result |
//! | --- | --- |
//! | [WrappedFuture::make] | settles when the executor calls its resolver |
//! | [WrappedFuture::resolve] | already fulfilled, value kept as-is |
//! | [WrappedFuture::reject] | already rejected |
//! | [WrappedFuture::map] | fulfils with the callback's value, never flattened |
//! | [WrappedFuture::then] | adopts the returned future, one level |
//! | [WrappedFuture::catch] | recovers from a rejection |
//! | [WrappedFuture::finally] | runs a side effect on either outcome |
//! | [all] | ordered join, first rejection wins |
//! | [race] | first settlement wins |
//!
//! # Example
//!
//! ```
//! use pledge::error::{raise, Exception};
//! use pledge::task::Executor;
//! use pledge::wrapped::WrappedFuture;
//!
//! #[derive(Debug)]
//! struct Overflow;
//! impl Exception for Overflow {}
//!
//! let chain = WrappedFuture::resolve(250u8)
//!     .map(|n| n.checked_add(10).unwrap_or_else(|| raise(Overflow)))
//!     .catch(|e| if e.exception().is_some_and(|x| x.is::<Overflow>()) { u8::MAX } else { 0 })
//!     .then(|n| WrappedFuture::resolve(n / 5));
//!
//! assert_eq!(Executor::block_on(async move { chain.await }).unwrap(), 51);
//! ```
use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    task::{ready, Context, Poll},
};

use log::{debug, trace};

use crate::{
    error::{guarded, Failure, UnifiedError},
    futures::promise::{Promise, Resolver, Settle, Settlement},
    task::Executor,
};

mod concurrent;
mod recover;
mod transform;

pub use concurrent::{all, all2, all3, all_settled, race};

/// A typed handle around a host promise settling to `T` or a
/// [UnifiedError].
///
/// Cloning the handle is cheap; every clone observes the same settlement.
pub struct WrappedFuture<T> {
    host: Promise<T>,
}

impl<T> Clone for WrappedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
        }
    }
}

impl<T> fmt::Debug for WrappedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedFuture").finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> WrappedFuture<T> {
    /// Run `executor` synchronously with the resolver of a new future.
    ///
    /// The future settles on the first call to [Resolver::resolve] or
    /// [Resolver::reject]; later calls are ignored. If `executor` panics
    /// before settling, the future rejects with the panic payload.
    pub fn make(executor: impl FnOnce(Resolver<T>)) -> Self {
        let (host, resolver) = Promise::pending();
        let on_throw = resolver.clone();

        if let Err(failure) = guarded(move || executor(resolver)) {
            trace!("make executor threw, rejecting");
            on_throw.reject(failure);
        }

        Self { host }
    }

    /// An already fulfilled future.
    ///
    /// `value` is never flattened: resolving with a `WrappedFuture` yields a
    /// future of a future.
    pub fn resolve(value: T) -> Self {
        Self {
            host: Promise::fulfilled(value),
        }
    }

    /// An already rejected future.
    ///
    /// An [Exception](crate::error::Exception) is seen as a
    /// [UnifiedError::DomainFailure] by recovery handlers; other values are
    /// classified by their shape.
    pub fn reject(error: impl Into<Failure>) -> Self {
        Self {
            host: Promise::rejected(error),
        }
    }

    /// Run a native future on this thread's executor and settle with its
    /// result.
    pub fn from_future<Fut, E>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + 'static,
        E: Into<Failure>,
    {
        Self::make(|resolver| {
            Executor::spawn(async move {
                match fut.await {
                    Ok(value) => resolver.resolve(value),
                    Err(e) => resolver.reject(e),
                }
            });
        })
    }

    /// Wrap any host future offering the [Settle] capability.
    pub fn adopt(host: &impl Settle<T>) -> Self {
        let (promise, resolver) = Promise::pending();
        let on_reject = resolver.clone();

        host.attach_on_settle(
            move |value| resolver.resolve(value),
            move |failure| on_reject.reject(failure),
        );

        Self { host: promise }
    }

    pub fn as_host(&self) -> &Promise<T> {
        &self.host
    }

    pub fn into_host(self) -> Promise<T> {
        self.host
    }

    pub fn is_pending(&self) -> bool {
        self.host.is_pending()
    }

    /// Terminate a chain, discarding its outcome.
    pub fn done(&self) {
        self.host.on_settle(|outcome| {
            if let Err(failure) = outcome {
                debug!("chain finished with {:?}", UnifiedError::classify(&failure));
            }
        });
    }

    /// Attach a continuation whose outcome settles a new future.
    pub(crate) fn chain<U: Clone + 'static>(
        &self,
        f: impl FnOnce(Result<T, Failure>, Resolver<U>) + 'static,
    ) -> WrappedFuture<U> {
        let (host, resolver) = Promise::pending();

        self.host.on_settle(move |outcome| f(outcome, resolver));

        WrappedFuture { host }
    }
}

impl<T> From<Promise<T>> for WrappedFuture<T> {
    fn from(host: Promise<T>) -> Self {
        Self { host }
    }
}

impl<T> From<WrappedFuture<T>> for Promise<T> {
    fn from(value: WrappedFuture<T>) -> Self {
        value.host
    }
}

/// Future returned by `.await`ing a [WrappedFuture].
pub struct Settled<T> {
    inner: Settlement<T>,
}

impl<T: Clone + 'static> Future for Settled<T> {
    type Output = Result<T, UnifiedError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.inner).poll(cx));

        Poll::Ready(outcome.map_err(UnifiedError::from))
    }
}

impl<T: Clone + 'static> IntoFuture for WrappedFuture<T> {
    type Output = Result<T, UnifiedError>;
    type IntoFuture = Settled<T>;

    fn into_future(self) -> Self::IntoFuture {
        Settled {
            inner: self.host.into_future(),
        }
    }
}
