//! Host promises.
//!
//! A [Promise] is the executor's native one-shot future: a write-once cell that
//! eventually settles to a value or a [Failure]. Continuations are attached
//! through the [Settle] capability and always run on a deferred turn of the
//! executor (see [Executor::defer]), in the order they were attached, even
//! when the promise has already settled.
//!
//! Settlement happens through a [Resolver]. Only the first call to
//! [Resolver::resolve] or [Resolver::reject] has any effect.
//!
//! A rejected promise that is dropped without anybody ever having attached a
//! continuation is reported as an unhandled rejection through `log`.
//!
//! # Example
//!
//! ```
//! use pledge::futures::promise::{Promise, Settle};
//! use pledge::task::Executor;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let (promise, resolver) = Promise::pending();
//! let seen = Rc::new(Cell::new(0));
//! {
//!     let seen = seen.clone();
//!     promise.attach_on_settle(move |v| seen.set(v), |_| {});
//! }
//! resolver.resolve(7);
//! resolver.resolve(8);
//!
//! assert_eq!(seen.get(), 0);
//! Executor::run();
//! assert_eq!(seen.get(), 7);
//! ```
use std::{
    cell::RefCell,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use log::{trace, warn};

use crate::{error::Failure, task::Executor};

type Reaction<T> = Box<dyn FnOnce(Result<T, Failure>)>;

enum State<T> {
    Pending(Vec<Reaction<T>>),
    Fulfilled(T),
    Rejected(Failure),
}

struct Inner<T> {
    state: State<T>,
    handled: bool,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let State::Rejected(failure) = &self.state {
            if !self.handled {
                warn!("unhandled rejection: {failure:?}");
            }
        }
    }
}

/// The capability to observe the settlement of a host future.
///
/// Anything offering this capability can be adopted by
/// [WrappedFuture](crate::wrapped::WrappedFuture).
pub trait Settle<T> {
    /// Attach continuations to run on a later turn once the future settles.
    /// Exactly one of them runs.
    fn attach_on_settle(
        &self,
        on_fulfill: impl FnOnce(T) + 'static,
        on_reject: impl FnOnce(Failure) + 'static,
    );

    /// Attach a single continuation receiving whichever outcome happens.
    fn on_settle(&self, f: impl FnOnce(Result<T, Failure>) + 'static) {
        let f = Rc::new(RefCell::new(Some(f)));
        let g = f.clone();

        self.attach_on_settle(
            move |value| {
                if let Some(f) = f.borrow_mut().take() {
                    f(Ok(value))
                }
            },
            move |failure| {
                if let Some(g) = g.borrow_mut().take() {
                    g(Err(failure))
                }
            },
        );
    }
}

/// A host future.
///
/// Cloning a promise yields another handle to the same settlement.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// The write-once capability to settle a [Promise].
pub struct Resolver<T> {
    promise: Promise<T>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    fn with_state(state: State<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state,
                handled: false,
            })),
        }
    }

    /// Create an unsettled promise together with the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        let promise = Self::with_state(State::Pending(Vec::new()));
        let resolver = Resolver {
            promise: promise.clone(),
        };

        (promise, resolver)
    }

    pub fn fulfilled(value: T) -> Self {
        Self::with_state(State::Fulfilled(value))
    }

    pub fn rejected(failure: impl Into<Failure>) -> Self {
        Self::with_state(State::Rejected(failure.into()))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending(_))
    }

    fn settle(&self, outcome: Result<T, Failure>) {
        let reactions = {
            let mut inner = self.inner.borrow_mut();

            if !matches!(inner.state, State::Pending(_)) {
                trace!("ignoring settlement of an already settled promise");
                return;
            }

            let next = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(failure) => State::Rejected(failure.clone()),
            };

            match std::mem::replace(&mut inner.state, next) {
                State::Pending(reactions) => reactions,
                State::Fulfilled(_) | State::Rejected(_) => Vec::new(),
            }
        };

        for reaction in reactions {
            let outcome = outcome.clone();
            Executor::defer(move || reaction(outcome));
        }
    }

    fn react(&self, reaction: Reaction<T>) {
        let mut inner = self.inner.borrow_mut();
        inner.handled = true;

        let outcome = match &mut inner.state {
            State::Pending(reactions) => {
                reactions.push(reaction);
                return;
            }
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(failure) => Err(failure.clone()),
        };

        Executor::defer(move || reaction(outcome));
    }
}

impl<T: Clone + 'static> Settle<T> for Promise<T> {
    fn attach_on_settle(
        &self,
        on_fulfill: impl FnOnce(T) + 'static,
        on_reject: impl FnOnce(Failure) + 'static,
    ) {
        self.react(Box::new(move |outcome| match outcome {
            Ok(value) => on_fulfill(value),
            Err(failure) => on_reject(failure),
        }));
    }

    fn on_settle(&self, f: impl FnOnce(Result<T, Failure>) + 'static) {
        self.react(Box::new(f));
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Fulfil the promise with `value`, unless it has already settled.
    pub fn resolve(&self, value: T) {
        self.promise.settle(Ok(value));
    }

    /// Reject the promise, unless it has already settled.
    pub fn reject(&self, failure: impl Into<Failure>) {
        self.promise.settle(Err(failure.into()));
    }

    pub(crate) fn settle(&self, outcome: Result<T, Failure>) {
        self.promise.settle(outcome);
    }
}

struct Waiter<T> {
    outcome: Option<Result<T, Failure>>,
    waker: Option<Waker>,
}

/// Future returned by `.await`ing a [Promise].
pub struct Settlement<T> {
    promise: Promise<T>,
    waiter: Option<Rc<RefCell<Waiter<T>>>>,
}

impl<T: Clone + 'static> Future for Settlement<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let waiter = this.waiter.get_or_insert_with(|| {
            let waiter = Rc::new(RefCell::new(Waiter {
                outcome: None,
                waker: None,
            }));
            let w = waiter.clone();

            this.promise.on_settle(move |outcome| {
                let waker = {
                    let mut w = w.borrow_mut();
                    w.outcome = Some(outcome);
                    w.waker.take()
                };

                if let Some(waker) = waker {
                    waker.wake();
                }
            });

            waiter
        });

        let mut waiter = waiter.borrow_mut();

        match waiter.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                waiter.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: Clone + 'static> IntoFuture for Promise<T> {
    type Output = Result<T, Failure>;
    type IntoFuture = Settlement<T>;

    fn into_future(self) -> Self::IntoFuture {
        Settlement {
            promise: self,
            waiter: None,
        }
    }
}
