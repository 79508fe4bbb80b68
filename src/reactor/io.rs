use std::{cell::RefCell, io, task::Poll, time::Duration};

use slab::Slab;

use super::uring::ReactorInner;

#[derive(Debug)]
pub(crate) enum TimeoutState {
    New,
    Submitted(usize),
    Finished(i32),
    Failed(io::ErrorKind),
}

/// A single timeout submitted to the per-thread ring.
pub(crate) struct TimeoutIo<'a, T> {
    state: TimeoutState,
    ring: &'a RefCell<ReactorInner<T>>,
}

impl From<&TimeoutState> for Poll<io::Result<()>> {
    fn from(value: &TimeoutState) -> Self {
        match value {
            TimeoutState::New | TimeoutState::Submitted(_) => Poll::Pending,
            // An expired timeout completes with -ETIME.
            TimeoutState::Finished(result) if *result == -libc::ETIME || *result >= 0 => {
                Poll::Ready(Ok(()))
            }
            TimeoutState::Finished(result) => {
                Poll::Ready(Err(io::Error::from_raw_os_error(result.abs())))
            }
            TimeoutState::Failed(kind) => Poll::Ready(Err((*kind).into())),
        }
    }
}

impl<'a, T> TimeoutIo<'a, T> {
    pub(super) fn new(ring: &'a RefCell<ReactorInner<T>>) -> Self {
        Self {
            state: TimeoutState::New,
            ring,
        }
    }

    pub fn submit_or_get_result(&mut self, f: impl FnOnce() -> (Duration, T)) -> Poll<io::Result<()>> {
        match self.state {
            TimeoutState::New => {
                let (duration, obj) = f();
                let submitted = self.ring.borrow_mut().submit_timeout(duration, obj);

                match submitted {
                    Ok(slot) => self.state = TimeoutState::Submitted(slot),
                    Err(e) => {
                        self.state = TimeoutState::Failed(e.kind());
                        return Poll::Ready(Err(e));
                    }
                }
            }
            TimeoutState::Submitted(slot) => {
                let mut ring = self.ring.borrow_mut();
                if let Some(res) = ring.results.get_result(slot) {
                    self.state = TimeoutState::Finished(res);
                    ring.results.drop_result(slot);
                }
            }
            TimeoutState::Finished(_) | TimeoutState::Failed(_) => {}
        }

        (&self.state).into()
    }
}

impl<T> Drop for TimeoutIo<'_, T> {
    fn drop(&mut self) {
        if let TimeoutState::Submitted(slot) = self.state {
            self.ring.borrow_mut().results.drop_result(slot);
        }
    }
}

pub struct RingResults(pub(super) Slab<ResultState>);

pub(super) enum ResultState {
    Pending,
    Set(i32),
    Dropped,
}

impl RingResults {
    pub fn new() -> Self {
        Self(Slab::new())
    }

    pub fn set_result(&mut self, result: i32, idx: usize) {
        let Some(r_entry) = self.0.get_mut(idx) else {
            return;
        };

        if matches!(r_entry, ResultState::Dropped) {
            self.0.remove(idx);
        } else {
            *r_entry = ResultState::Set(result);
        }
    }

    pub fn get_result(&self, idx: usize) -> Option<i32> {
        match self.0.get(idx)? {
            ResultState::Pending | ResultState::Dropped => None,
            ResultState::Set(result) => Some(*result),
        }
    }

    pub fn drop_result(&mut self, idx: usize) {
        let Some(r_entry) = self.0.get_mut(idx) else {
            return;
        };

        if matches!(r_entry, ResultState::Set(_)) {
            self.0.remove(idx);
        } else {
            *r_entry = ResultState::Dropped;
        }
    }

    pub fn create_slot(&mut self) -> usize {
        self.0.insert(ResultState::Pending)
    }
}
