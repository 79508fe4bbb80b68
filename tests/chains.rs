use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Result;
use pledge::{
    error::{raise, throw, Exception, Failure, HostError, UnifiedError},
    futures::timer::Timer,
    task::Executor,
    wrapped::{all, race, WrappedFuture},
};

#[derive(Debug, Clone, PartialEq)]
enum Fetch {
    NotFound { path: String },
    Refused(u16),
}

impl Exception for Fetch {
    fn tag(&self) -> &'static str {
        match self {
            Fetch::NotFound { .. } => "NotFound",
            Fetch::Refused(_) => "Refused",
        }
    }
}

fn settle<T: Clone + 'static>(fut: WrappedFuture<T>) -> Result<T, UnifiedError> {
    Executor::block_on(async move { fut.await })
}

/// Fulfils with `f()` once `delay` has elapsed.
fn after<T>(delay: Duration, f: impl FnOnce() -> T + 'static) -> WrappedFuture<T>
where
    T: Clone + 'static,
{
    WrappedFuture::from_future(async move {
        Timer::sleep(delay).await.map_err(Failure::new)?;
        Ok::<_, Failure>(f())
    })
}

#[test]
fn resolve_fulfils_with_its_value() {
    for v in [0, 1, -7, i64::MAX] {
        assert_eq!(settle(WrappedFuture::resolve(v)).unwrap(), v);
    }
}

#[test]
fn map_matches_then_of_resolve() {
    let f = |s: String| s.len();

    for input in ["", "a", "promise"] {
        let mapped = settle(WrappedFuture::resolve(input.to_owned()).map(f)).unwrap();
        let chained = settle(
            WrappedFuture::resolve(input.to_owned()).then(move |s| WrappedFuture::resolve(f(s))),
        )
        .unwrap();

        assert_eq!(mapped, chained);
    }
}

#[test]
fn then_flattens_exactly_one_level() {
    let seen = Rc::new(Cell::new(0));
    let s = seen.clone();

    let fut = WrappedFuture::resolve(1)
        .then(|n| WrappedFuture::resolve(n + 1))
        .then(move |v| {
            s.set(v);
            WrappedFuture::resolve(())
        });

    settle(fut).unwrap();
    assert_eq!(seen.get(), 2);
}

#[test]
fn double_nesting_hands_back_a_future() {
    // Treating the payload as a plain number is rejected at compile time; what
    // arrives is a handle that still has to be awaited.
    let fut = WrappedFuture::resolve(1)
        .then(|n| WrappedFuture::resolve(WrappedFuture::resolve(n + 1)))
        .then(|inner: WrappedFuture<i32>| inner.map(|v| v * 100));

    assert_eq!(settle(fut).unwrap(), 200);
}

#[test]
fn reject_then_catch_sees_the_same_exception() {
    let thrown = Fetch::NotFound {
        path: "/index.html".into(),
    };

    let caught =
        settle(WrappedFuture::<UnifiedError>::reject(thrown.clone()).catch(|e| e)).unwrap();

    let exn = caught.exception().unwrap();
    assert_eq!(exn.tag(), "NotFound");
    assert_eq!(exn.downcast_ref(), Some(&thrown));
}

#[test]
fn throws_inside_callbacks_become_rejections() {
    let domain = WrappedFuture::resolve(503u16)
        .map(|code| -> u16 { raise(Fetch::Refused(code)) })
        .catch(|e| match e {
            UnifiedError::DomainFailure(exn) => match exn.downcast_ref::<Fetch>() {
                Some(Fetch::Refused(code)) => *code,
                Some(Fetch::NotFound { .. }) => 404,
                None => 0,
            },
            _ => 0,
        });
    assert_eq!(settle(domain).unwrap(), 503);

    let host = WrappedFuture::resolve(())
        .then(|()| -> WrappedFuture<String> { throw(HostError::new("x is not a function")) })
        .catch(|e| match e {
            UnifiedError::HostFailure(err) => err.message().to_owned(),
            other => format!("unexpected: {other}"),
        });
    assert_eq!(settle(host).unwrap(), "x is not a function");
}

#[test]
fn catch_allows_recovery_downstream() {
    let fut = WrappedFuture::<u32>::reject(Fetch::Refused(1))
        .then(|n| WrappedFuture::resolve(n + 1))
        .catch(|_| 41)
        .then(|n| WrappedFuture::resolve(n + 1))
        .map(|n| n.to_string());

    assert_eq!(settle(fut).unwrap(), "42");
}

#[test]
fn finally_runs_on_both_branches() {
    let fulfilled_flag = Rc::new(Cell::new(false));
    let rejected_flag = Rc::new(Cell::new(false));

    let fulfilled = {
        let flag = fulfilled_flag.clone();
        WrappedFuture::resolve("body").finally(move || flag.set(true))
    };
    let rejected = {
        let flag = rejected_flag.clone();
        WrappedFuture::<&str>::reject(Fetch::Refused(500)).finally(move || flag.set(true))
    };

    assert_eq!(settle(fulfilled).unwrap(), "body");
    assert!(fulfilled_flag.get());

    let e = settle(rejected).unwrap_err();
    assert!(rejected_flag.get());
    assert_eq!(
        e.exception().and_then(|x| x.downcast_ref()),
        Some(&Fetch::Refused(500))
    );
}

#[test]
fn all_preserves_input_order_not_completion_order() -> Result<()> {
    let completed = Rc::new(RefCell::new(0));
    let marker = |delay_ms: u64| {
        let completed = completed.clone();
        after(Duration::from_millis(delay_ms), move || {
            *completed.borrow_mut() += 1;
            (delay_ms, *completed.borrow())
        })
    };

    let before = Instant::now();
    let results = settle(all([marker(1000), marker(500), marker(100)]))?;

    assert_eq!(results, vec![(1000, 3), (500, 2), (100, 1)]);
    assert!(before.elapsed() >= Duration::from_millis(1000));
    assert!(before.elapsed() < Duration::from_millis(1500));

    Ok(())
}

#[test]
fn race_is_won_by_the_fastest() -> Result<()> {
    let losers_finished = Rc::new(Cell::new(0));
    let entrant = |delay_ms: u64, name: &'static str| {
        let losers_finished = losers_finished.clone();
        after(Duration::from_millis(delay_ms), move || {
            losers_finished.set(losers_finished.get() + 1);
            name
        })
    };

    let winner = settle(race([
        entrant(1000, "p1"),
        entrant(500, "p2"),
        entrant(100, "p3"),
    ]))?;

    assert_eq!(winner, "p3");
    // Nothing is cancelled: the slower entrants still ran to completion.
    assert_eq!(losers_finished.get(), 3);

    Ok(())
}

#[test]
fn all_rejects_without_cancelling_the_rest() {
    let slow_ran = Rc::new(Cell::new(false));
    let s = slow_ran.clone();

    let joined = all([
        after(Duration::from_millis(300), move || s.set(true)),
        WrappedFuture::make(|r| {
            Executor::spawn(async move {
                Timer::sleep(Duration::from_millis(50)).await.unwrap();
                r.reject(Fetch::Refused(7));
            });
        }),
    ]);

    let before = Instant::now();
    let rejected_after = Rc::new(Cell::new(None));
    let r = rejected_after.clone();
    let timed = joined.finally(move || r.set(Some(before.elapsed())));

    let e = settle(timed).unwrap_err();
    assert!(e.exception().is_some_and(|x| x.is::<Fetch>()));

    // Settled by the 50ms rejection, not by the 300ms input.
    let rejected_after = rejected_after.get().unwrap();
    assert!(rejected_after >= Duration::from_millis(50));
    assert!(rejected_after < Duration::from_millis(200));

    // Still ran to completion afterwards.
    assert!(slow_ran.get());
}

#[test]
fn await_interop_with_anyhow() -> Result<()> {
    let value = Executor::block_on(async {
        let n = WrappedFuture::resolve(2).map(|n| n * 21).await?;
        Ok::<_, anyhow::Error>(n)
    })?;
    assert_eq!(value, 42);

    let err = Executor::block_on(async {
        WrappedFuture::<u8>::reject(Fetch::Refused(1)).await?;
        Ok::<_, anyhow::Error>(())
    })
    .unwrap_err();
    assert!(err.downcast_ref::<UnifiedError>().is_some());

    Ok(())
}
