pub(crate) use io::TimeoutIo;
use std::{mem::transmute, task::Waker};
use uring::ReactorUring;

mod io;
mod uring;

pub type ReactorIo = TimeoutIo<'static, Waker>;

pub(crate) struct Reactor {}

thread_local! {
    static REACTOR: ReactorUring<Waker> = ReactorUring::new();
}

impl Reactor {
    pub fn new_io() -> ReactorIo {
        REACTOR.with(|r| unsafe { transmute(r.new_io()) })
    }

    /// Whether any timeout is still in flight on this thread's ring.
    pub fn is_idle() -> bool {
        REACTOR.with(|r| r.is_idle())
    }

    pub fn react() {
        REACTOR.with(|r| {
            for waker in r.react().into_iter() {
                waker.wake();
            }
        })
    }
}
