//! Future sub-modules.
//!
//! The `futures` module holds the host-side futures of the `pledge` executor:
//! the primitives the rest of the crate is built upon.
//!
//! The following sub-modules are exposed by the `futures` module:
//!
//! - `promise`: The host's native one-shot future, settled through a
//!   resolver and observed through deferred continuations.
//! - `timer`: Implements futures for timer-based tasks using io_uring
//!   timeouts.
//!
//! The typed combinators over host promises live in
//! [wrapped](crate::wrapped).
pub mod promise;
pub mod timer;
