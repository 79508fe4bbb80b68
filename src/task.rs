//! Task and execution management
//!
//! This module provides the methods needed to spawn tasks and execute them
//! until completion. Pledge uses a per-thread executor model which means that
//! each new OS thread that is spawned has its own execution environment. This
//! means that:
//!
//! 1. The thread upon which a task is spawned is the same thread that will
//!    execute it.
//! 2. Each thread needs to call one of [Executor::block_on] or [Executor::run]
//!    to do any work. Use the former if you want to run a single top-level
//!    task, or the latter if you wish to run multiple top-level tasks.
//!
//! Besides tasks, the executor owns a FIFO queue of *deferred turns*: plain
//! callbacks queued with [Executor::defer]. Promise continuations are always
//! delivered as deferred turns, so attaching a continuation never runs it
//! synchronously. All pending turns are drained before the next task is
//! polled.
//!
//! # Example
//!
//! Here is a simple hello world using [Executor::block_on].
//!
//! ```
//! use pledge::task::Executor;
//! Executor::block_on(async { println!("Hello, world!"); });
//! ```
//!
//! You can also use [Executor::block_on] to easily obtain the result of a
//! future:
//!
//! ```
//! use pledge::task::Executor;
//! let x = Executor::block_on(async { 2 + 8 });
//! assert_eq!(x, 10);
//! ```
//!
//! Deferred turns run in the order they were queued:
//!
//! ```
//! use pledge::task::Executor;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! let order = Rc::new(RefCell::new(Vec::new()));
//! for i in 0..3 {
//!     let order = order.clone();
//!     Executor::defer(move || order.borrow_mut().push(i));
//! }
//! assert!(order.borrow().is_empty());
//! Executor::run();
//! assert_eq!(*order.borrow(), vec![0, 1, 2]);
//! ```
//!
//! # Threading Model
//!
//! Since each thread has its own execution state, if you don't spawn any new
//! threads you can guarantee that only a single task will be executing at once.
//! This allows for `!Sync` futures to be executed:
//!
//! ```
//! use pledge::task::Executor;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! let cell = Rc::new(RefCell::new(0));
//! {
//!     let cell = cell.clone();
//!     Executor::spawn(async move { *cell.borrow_mut() += 10 });
//! }
//! {
//!     let cell = cell.clone();
//!     Executor::spawn(async move { *cell.borrow_mut() += 10 });
//! }
//! Executor::run();
//! assert_eq!(*cell.borrow(), 20);
//! ```
use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    pin::Pin,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll, Wake, Waker},
};

use log::{trace, warn};
use slab::Slab;

use crate::reactor::Reactor;

/// Slot value of a task that is queued or currently being polled.
const RUNNABLE: usize = usize::MAX;

struct TaskId {
    slot: AtomicUsize,
    notified: AtomicBool,
}

impl Wake for TaskId {
    fn wake(self: Arc<TaskId>) {
        let slot = self.slot.load(Ordering::Relaxed);

        if slot == RUNNABLE {
            self.notified.store(true, Ordering::Relaxed);
            return;
        }

        EXEC.with(|exec| {
            let mut exec = exec.borrow_mut();

            // A stale waker may point at a slot that was already woken.
            if let Some(task) = exec.waiting.try_remove(slot) {
                task.id.slot.store(RUNNABLE, Ordering::Relaxed);
                exec.run_q.push(task);
            }
        });
    }
}

struct Task {
    id: Arc<TaskId>,
    future: Pin<Box<dyn Future<Output = ()>>>,
}

type Turn = Box<dyn FnOnce()>;

/// The async executor.
///
/// A type that is responsible for pushing futures through to
/// completion. You can begin execution of a new task by calling the
/// [Executor::block_on] function.
pub struct Executor {
    waiting: Slab<Task>,
    run_q: Vec<Task>,
    turns: VecDeque<Turn>,
}

thread_local! {
    static EXEC: RefCell<Executor> = const { RefCell::new(
        Executor {
            waiting: Slab::new(),
            run_q: Vec::new(),
            turns: VecDeque::new(),
        }
    )}
}

struct JoinSlot<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

/// A handle to a running task.
///
/// You can call [TaskJoiner::join] from a synchronous context to drive the
/// executor and yield the future's value. If you want to wait for execution to
/// finish from an asynchronous context, use `.await` on the joiner. If the
/// joiner is dropped then execution of the future continues to completion but
/// the return value is lost, aka detach-on-drop.
pub struct TaskJoiner<T> {
    slot: Rc<RefCell<JoinSlot<T>>>,
}

impl<T> TaskJoiner<T> {
    /// Run this thread's executor until the task has finished and return the
    /// value `T` yielded by the task's future.
    ///
    /// *Note* This function should only be called from synchronous contexts. To
    /// prevent deadlocks in an asynchronous context, use `.await` instead.
    ///
    /// # Panics
    ///
    /// Panics if the executor runs out of work before the task finished, i.e.
    /// the task is waiting on something that will never happen. Use
    /// [TaskJoiner::try_join] when that is a legitimate outcome.
    pub fn join(self) -> T {
        self.try_join().expect("joined task stalled before producing a value")
    }

    /// Like [TaskJoiner::join], but returns `None` if the task stalled.
    pub fn try_join(self) -> Option<T> {
        if let Some(value) = self.slot.borrow_mut().value.take() {
            return Some(value);
        }

        Executor::executor_loop();

        let value = self.slot.borrow_mut().value.take();

        if value.is_none() {
            warn!("joined task stalled before producing a value");
        }

        value
    }
}

impl<T> Future for TaskJoiner<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();

        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Executor {
    /// Spawn a new future and add it to this thread's run queue. If called from
    /// an already-running asynchronous task, the future will be queued for
    /// execution. If called from a synchronous context, the task will *not* be
    /// executed until [Executor::run] is called.
    ///
    /// A [TaskJoiner] is returned which can be used to wait for completion of
    /// the future `f` and obtain its return value.
    pub fn spawn<Fut, T>(f: Fut) -> TaskJoiner<T>
    where
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        let slot = Rc::new(RefCell::new(JoinSlot {
            value: None,
            waker: None,
        }));
        let task_slot = slot.clone();

        let fut = async move {
            let value = f.await;
            let waker = {
                let mut slot = task_slot.borrow_mut();
                slot.value = Some(value);
                slot.waker.take()
            };

            if let Some(waker) = waker {
                waker.wake();
            }
        };

        let task = Task {
            id: Arc::new(TaskId {
                slot: AtomicUsize::new(RUNNABLE),
                notified: AtomicBool::new(false),
            }),
            future: Box::pin(fut),
        };

        EXEC.with(|exec| {
            exec.borrow_mut().run_q.push(task);
        });

        TaskJoiner { slot }
    }

    /// Queue `f` to run on a later turn of this thread's event loop.
    ///
    /// Turns run in FIFO order, before any further task is polled. A turn
    /// queued from within another turn runs after every turn that was already
    /// queued.
    pub fn defer(f: impl FnOnce() + 'static) {
        EXEC.with(|exec| exec.borrow_mut().turns.push_back(Box::new(f)));
    }

    /// A convenience function for waiting on a future from a synchronous
    /// context. This is the equivalent of calling:
    ///
    /// ```
    /// # use pledge::task::Executor;
    /// # use std::future::Future;
    /// # fn x<Fut: Future<Output = ()> + 'static>(f: Fut) {
    /// let task = Executor::spawn(f);
    /// Executor::run();
    /// task.join();
    /// # }
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `f` stalls, see [TaskJoiner::join].
    pub fn block_on<Fut, T>(f: Fut) -> T
    where
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        let joiner = Self::spawn(f);

        Self::executor_loop();

        joiner.join()
    }

    /// Like [Executor::block_on], but returns `None` instead of panicking when
    /// `f` waits on something that will never happen, e.g. a race with no
    /// entrants.
    pub fn try_block_on<Fut, T>(f: Fut) -> Option<T>
    where
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        Self::spawn(f).try_join()
    }

    /// Run the executor for this thread.
    ///
    /// This function will schedule and run all tasks that have been previously
    /// spawned with [Executor::spawn] and all turns queued with
    /// [Executor::defer]. *Note* each thread has its own set of tasks and
    /// execution environment. If you call this function, only work that was
    /// queued on *this* thread will be executed.
    ///
    /// Returns once there is nothing left that could make progress.
    pub fn run() {
        Self::executor_loop()
    }

    fn next_turn() -> Option<Turn> {
        EXEC.with(|exec| exec.borrow_mut().turns.pop_front())
    }

    fn drain_turns() {
        while let Some(turn) = Self::next_turn() {
            turn();
        }
    }

    fn executor_loop() {
        loop {
            Self::drain_turns();

            let Some(mut task) = EXEC.with(|exec| exec.borrow_mut().run_q.pop()) else {
                let (turns, waiting) =
                    EXEC.with(|exec| {
                        let exec = exec.borrow();
                        (exec.turns.len(), exec.waiting.len())
                    });

                if turns > 0 {
                    continue;
                }

                if waiting == 0 {
                    return;
                }

                if Reactor::is_idle() {
                    warn!("{waiting} task(s) stalled: nothing left that could wake them");
                    return;
                }

                trace!("no runnable work, waiting on reactor");
                Reactor::react();
                continue;
            };

            let waker = Waker::from(task.id.clone());
            let mut cx = Context::from_waker(&waker);

            match task.future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending if task.id.notified.swap(false, Ordering::Relaxed) => {
                    EXEC.with(|exec| exec.borrow_mut().run_q.push(task));
                }
                Poll::Pending => EXEC.with(|exec| {
                    let waiting = &mut exec.borrow_mut().waiting;
                    let slot = waiting.vacant_entry();

                    task.id.slot.store(slot.key(), Ordering::Relaxed);
                    slot.insert(task);
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::Executor;

    #[test]
    fn deferred_turns_run_in_order() {
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..4 {
            let order = order.clone();
            Executor::defer(move || order.borrow_mut().push(i));
        }

        Executor::run();

        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn nested_turns_run_after_queued_ones() {
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let order = order.clone();
            Executor::defer(move || {
                order.borrow_mut().push("outer");
                let inner = order.clone();
                Executor::defer(move || inner.borrow_mut().push("nested"));
            });
        }
        {
            let order = order.clone();
            Executor::defer(move || order.borrow_mut().push("sibling"));
        }

        Executor::run();

        assert_eq!(*order.borrow(), vec!["outer", "sibling", "nested"]);
    }

    #[test]
    fn subtask_value() {
        let x = Executor::block_on(async {
            let t = Executor::spawn(async { 24 });
            t.await + 1
        });

        assert_eq!(x, 25);
    }

    #[test]
    fn non_send_values() {
        let v = Executor::block_on(async { Rc::new(5) });

        assert_eq!(*v, 5);
    }

    #[test]
    fn stalled_task_does_not_hang_run() {
        let _stuck = Executor::spawn(std::future::pending::<()>());

        Executor::run();
    }

    #[test]
    fn try_block_on_stalled() {
        assert_eq!(Executor::try_block_on(std::future::pending::<u8>()), None);
        assert_eq!(Executor::try_block_on(async { 3 }), Some(3));
    }
}
