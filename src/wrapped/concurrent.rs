//! Fan-out/fan-in over several futures.
//!
//! None of these combinators cancel anything: inputs that lose a race or
//! settle after a join already rejected keep running to completion, and their
//! outcomes are simply ignored.
use std::{cell::RefCell, rc::Rc};

use log::debug;

use super::WrappedFuture;
use crate::{
    error::UnifiedError,
    futures::promise::{Promise, Settle},
};

struct Join<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Join<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Record the value of input `idx`, returning every value once the last
    /// one arrived.
    fn fill(&mut self, idx: usize, value: T) -> Option<Vec<T>> {
        if self.slots[idx].replace(value).is_none() {
            self.remaining -= 1;
        }

        if self.remaining > 0 {
            return None;
        }

        Some(self.slots.drain(..).flatten().collect())
    }
}

/// Wait for every future, fulfilling with their values in input order.
///
/// Rejects as soon as any input rejects, with that input's failure. An empty
/// input fulfils with an empty vector.
pub fn all<T: Clone + 'static>(
    futures: impl IntoIterator<Item = WrappedFuture<T>>,
) -> WrappedFuture<Vec<T>> {
    let futures: Vec<_> = futures.into_iter().collect();
    let (promise, resolver) = Promise::pending();

    debug!("all: joining {} futures", futures.len());

    if futures.is_empty() {
        resolver.resolve(Vec::new());
        return promise.into();
    }

    let join = Rc::new(RefCell::new(Join::new(futures.len())));

    for (idx, fut) in futures.iter().enumerate() {
        let join = join.clone();
        let on_fulfill = resolver.clone();
        let on_reject = resolver.clone();

        fut.host.attach_on_settle(
            move |value| {
                let values = join.borrow_mut().fill(idx, value);

                if let Some(values) = values {
                    debug!("all: every input fulfilled");
                    on_fulfill.resolve(values);
                }
            },
            move |failure| {
                debug!("all: input {idx} rejected");
                on_reject.reject(failure);
            },
        );
    }

    promise.into()
}

/// Wait for every future, never rejecting.
///
/// Each input's outcome is reported in input order, with failures normalized.
pub fn all_settled<T: Clone + 'static>(
    futures: impl IntoIterator<Item = WrappedFuture<T>>,
) -> WrappedFuture<Vec<Result<T, UnifiedError>>> {
    all(futures.into_iter().map(|fut| {
        fut.chain(|outcome, resolver| resolver.resolve(outcome.map_err(UnifiedError::from)))
    }))
}

/// Join two futures of different types.
pub fn all2<A, B>(a: &WrappedFuture<A>, b: &WrappedFuture<B>) -> WrappedFuture<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    let (promise, resolver) = Promise::pending();
    let pair = Rc::new(RefCell::new((None::<A>, None::<B>)));

    {
        let pair = pair.clone();
        let on_fulfill = resolver.clone();
        let on_reject = resolver.clone();

        a.host.attach_on_settle(
            move |value| {
                let mut pair = pair.borrow_mut();
                pair.0 = Some(value);

                if let (Some(a), Some(b)) = &*pair {
                    on_fulfill.resolve((a.clone(), b.clone()));
                }
            },
            move |failure| on_reject.reject(failure),
        );
    }

    {
        let on_reject = resolver.clone();

        b.host.attach_on_settle(
            move |value| {
                let mut pair = pair.borrow_mut();
                pair.1 = Some(value);

                if let (Some(a), Some(b)) = &*pair {
                    resolver.resolve((a.clone(), b.clone()));
                }
            },
            move |failure| on_reject.reject(failure),
        );
    }

    promise.into()
}

/// Join three futures of different types.
pub fn all3<A, B, C>(
    a: &WrappedFuture<A>,
    b: &WrappedFuture<B>,
    c: &WrappedFuture<C>,
) -> WrappedFuture<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    all2(&all2(a, b), c).map(|((a, b), c)| (a, b, c))
}

/// Settle like whichever future settles first.
///
/// An empty input never settles.
pub fn race<T: Clone + 'static>(
    futures: impl IntoIterator<Item = WrappedFuture<T>>,
) -> WrappedFuture<T> {
    let (promise, resolver) = Promise::pending();
    let mut entrants = 0;

    for fut in futures {
        let on_fulfill = resolver.clone();
        let on_reject = resolver.clone();

        fut.host.attach_on_settle(
            move |value| on_fulfill.resolve(value),
            move |failure| on_reject.reject(failure),
        );
        entrants += 1;
    }

    if entrants == 0 {
        debug!("race: no entrants, result will never settle");
    }

    promise.into()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::{all, all2, all3, all_settled, race};
    use crate::{
        error::{Exception, UnifiedError},
        task::Executor,
        wrapped::WrappedFuture,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Lost(u8);

    impl Exception for Lost {}

    fn settle<T: Clone + 'static>(fut: WrappedFuture<T>) -> Result<T, UnifiedError> {
        Executor::block_on(async move { fut.await })
    }

    /// A future settled by the returned closure.
    fn deferred<T: Clone + 'static>() -> (WrappedFuture<T>, impl FnOnce(Result<T, Lost>)) {
        let slot = Rc::new(RefCell::new(None));
        let s = slot.clone();
        let fut = WrappedFuture::make(move |r| *s.borrow_mut() = Some(r));
        let resolver = slot.borrow_mut().take();

        let finish = move |outcome: Result<T, Lost>| {
            if let Some(r) = resolver {
                match outcome {
                    Ok(v) => r.resolve(v),
                    Err(e) => r.reject(e),
                }
            }
        };

        (fut, finish)
    }

    #[test]
    fn all_keeps_input_order() {
        let (a, settle_a) = deferred();
        let (b, settle_b) = deferred();
        let (c, settle_c) = deferred();

        let joined = all([a, b, c]);

        settle_c(Ok("c"));
        settle_a(Ok("a"));
        settle_b(Ok("b"));

        assert_eq!(settle(joined).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn all_of_nothing() {
        assert!(settle(all(Vec::<WrappedFuture<u8>>::new())).unwrap().is_empty());
    }

    #[test]
    fn all_rejects_with_first_rejection() {
        let (a, settle_a) = deferred::<u8>();
        let (b, settle_b) = deferred::<u8>();
        let (c, settle_c) = deferred::<u8>();

        let joined = all([a, b, c]);

        settle_b(Err(Lost(2)));
        settle_c(Err(Lost(3)));
        settle_a(Ok(1));

        let e = settle(joined).unwrap_err();
        assert_eq!(e.exception().and_then(|x| x.downcast_ref()), Some(&Lost(2)));
    }

    #[test]
    fn all_settled_reports_every_outcome() {
        let outcomes = settle(all_settled([
            WrappedFuture::resolve(1),
            WrappedFuture::reject(Lost(9)),
            WrappedFuture::resolve(3),
        ]))
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().ok(), Some(&1));
        assert!(outcomes[1]
            .as_ref()
            .err()
            .and_then(UnifiedError::exception)
            .is_some_and(|x| x.is::<Lost>()));
        assert_eq!(outcomes[2].as_ref().ok(), Some(&3));
    }

    #[test]
    fn heterogeneous_joins() {
        let pair = all2(&WrappedFuture::resolve(1u8), &WrappedFuture::resolve("one"));
        assert_eq!(settle(pair).unwrap(), (1, "one"));

        let triple = all3(
            &WrappedFuture::resolve('x'),
            &WrappedFuture::resolve(2.5f32),
            &WrappedFuture::resolve(vec![1]),
        );
        assert_eq!(settle(triple).unwrap(), ('x', 2.5, vec![1]));

        let failed = all2(&WrappedFuture::resolve(1u8), &WrappedFuture::<()>::reject(Lost(0)));
        assert!(settle(failed).unwrap_err().exception().is_some());
    }

    #[test]
    fn race_takes_first_settlement() {
        let (a, settle_a) = deferred::<&str>();
        let (b, settle_b) = deferred::<&str>();

        let winner = race([a, b]);

        settle_b(Ok("b"));
        settle_a(Err(Lost(1)));

        assert_eq!(settle(winner).unwrap(), "b");
    }

    #[test]
    fn race_takes_first_rejection() {
        let (a, settle_a) = deferred::<&str>();
        let (b, settle_b) = deferred::<&str>();

        let winner = race([a, b]);

        settle_a(Err(Lost(1)));
        settle_b(Ok("b"));

        let e = settle(winner).unwrap_err();
        assert_eq!(e.exception().and_then(|x| x.downcast_ref()), Some(&Lost(1)));
    }

    #[test]
    fn empty_race_never_settles() {
        let never = race(Vec::<WrappedFuture<u8>>::new());
        let waiting = never.clone();

        assert!(Executor::try_block_on(async move { waiting.await }).is_none());
        assert!(never.is_pending());
    }
}
