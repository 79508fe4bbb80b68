//! # `pledge`: typed promises over a tiny executor
//!
//! This crate provides a typed combinator layer over a host promise: a
//! one-shot future that eventually settles to a value or a failure, whose
//! continuations run on a later turn of a single-threaded cooperative event
//! loop. Callers construct, transform, recover from and combine such futures
//! through [wrapped::WrappedFuture], and every failure they ever observe is
//! normalized into one [error::UnifiedError].
//!
//! The host side is a minimal per-thread executor (see [task]) backed by
//! io_uring for timers (see [futures]). Nothing here cancels anything: once
//! started, an operation runs to completion.
//!
//! The flattening split is static: [wrapped::WrappedFuture::map] takes a
//! `T -> U` callback and never flattens, [wrapped::WrappedFuture::then] takes
//! a `T -> WrappedFuture<U>` callback and flattens exactly one level.
//!
//! Synchronous throws are panics. They are caught at every combinator
//! boundary, which requires building with `panic = "unwind"`.
//!
//! ## Example
//!
//! Join three timers, which finish in reverse order, and observe their values
//! in input order:
//!
//! ```
//! use pledge::futures::timer::Timer;
//! use pledge::task::Executor;
//! use pledge::wrapped::{all, WrappedFuture};
//! use pledge::error::Failure;
//! use std::time::Duration;
//!
//! let after = |ms: u64| {
//!     WrappedFuture::from_future(async move {
//!         Timer::sleep(Duration::from_millis(ms)).await.map_err(Failure::new)?;
//!         Ok::<_, Failure>(ms)
//!     })
//! };
//!
//! let joined = all([after(300), after(200), after(100)]).map(|v| v.iter().sum::<u64>());
//! let values = Executor::block_on(async move { joined.await });
//! assert_eq!(values.unwrap(), 600);
//! ```
pub mod error;
pub mod futures;
pub(crate) mod reactor;
pub mod task;
pub mod wrapped;
