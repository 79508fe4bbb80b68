//! Async timer related futures.
//!
//! Timers are submitted to the per-thread io_uring as `IORING_OP_TIMEOUT`
//! entries. The main use-case for this is to put a task to sleep for a
//! specific period of time, or to settle a promise later on.
//!
//! # Example
//! Let's put a task to sleep for 200 milliseconds.
//! ```
//! use pledge::futures::timer::Timer;
//! use pledge::task::Executor;
//! use std::time::{Duration, Instant};
//! Executor::block_on(async {
//!     let now = Instant::now();
//!
//!     Timer::sleep(Duration::from_millis(200)).await?;
//!
//!     assert!(now.elapsed() >= Duration::from_millis(200));
//!     Ok::<(), std::io::Error>(())
//! })
//! .unwrap();
//! ```

use std::{
    future::Future,
    io::Result,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use crate::reactor::{Reactor, ReactorIo};

/// Asynchronous timer.
///
/// This structure is a future that will expire at some point in the future. It
/// can be obtained via the [Timer::sleep] function. If the ring backing the
/// timer cannot be created, `.await`ing yields the error instead.
pub struct Timer {
    duration: Duration,
    io: ReactorIo,
}

impl Timer {
    #[must_use]
    /// Put the current task to sleep for the specified duration.
    ///
    /// This function returns a future, that when `.await`ed will suspend the
    /// execution of the current task until the specified duration has elapsed.
    /// At that point the runtime will queue the task for execution. Note that
    /// it is guaranteed that the task will be suspended for *at least* the
    /// specified duration; it could sleep for longer.
    pub fn sleep(d: Duration) -> Self {
        Self {
            duration: d,
            io: Reactor::new_io(),
        }
    }
}

impl Future for Timer {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let duration = this.duration;

        this.io
            .submit_or_get_result(|| (duration, cx.waker().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::task::Executor;

    use super::Timer;

    #[test]
    fn sleep_simple() {
        let before = Instant::now();
        Executor::block_on(async {
            Timer::sleep(Duration::from_millis(300)).await.unwrap();
        });
        assert!(Instant::now() - before >= Duration::from_millis(300));
    }

    #[test]
    fn sleep_zero_completes() {
        Executor::block_on(async {
            Timer::sleep(Duration::ZERO).await.unwrap();
        });
    }

    #[test]
    fn sleep_multiple_tasks() {
        let before = Instant::now();
        let t1 = Executor::spawn(async {
            Timer::sleep(Duration::from_millis(300)).await.unwrap();
        });
        let t2 = Executor::spawn(async {
            Timer::sleep(Duration::from_millis(300)).await.unwrap();
        });
        let t3 = Executor::spawn(async {
            Timer::sleep(Duration::from_millis(600)).await.unwrap();
        });

        Executor::run();

        t1.join();
        t2.join();
        t3.join();
        assert!(Instant::now() - before >= Duration::from_millis(600));
        assert!(Instant::now() - before < Duration::from_millis(900));
    }

    #[test]
    fn sleep_subtasks() {
        let before = Instant::now();
        Executor::block_on(async move {
            Timer::sleep(Duration::from_millis(300)).await.unwrap();
            assert!(Instant::now() - before >= Duration::from_millis(300));

            let t1 = Executor::spawn(async {
                Timer::sleep(Duration::from_millis(300)).await.unwrap();
            });
            let t2 = Executor::spawn(async {
                Timer::sleep(Duration::from_millis(300)).await.unwrap();
            });

            t1.await;
            t2.await;
            assert!(Instant::now() - before >= Duration::from_millis(600));
            assert!(Instant::now() - before < Duration::from_millis(900));
        });
    }
}
