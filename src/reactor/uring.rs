use std::{cell::RefCell, io, time::Duration};

use io_uring::{opcode, squeue, types::Timespec, IoUring};
use log::{trace, warn};
use slab::Slab;

use super::io::{RingResults, TimeoutIo};

/// Submission queue depth of each per-thread ring.
pub const RING_ENTRIES: u32 = 1024;

pub struct ReactorUring<T>(RefCell<ReactorInner<T>>);

impl<T> ReactorUring<T> {
    pub fn new() -> Self {
        Self(RefCell::new(ReactorInner::new()))
    }

    pub fn new_io(&self) -> TimeoutIo<'_, T> {
        TimeoutIo::new(&self.0)
    }

    pub fn react(&self) -> Vec<T> {
        self.0.borrow_mut().react()
    }

    pub fn is_idle(&self) -> bool {
        self.0.borrow().objs.is_empty()
    }
}

struct InFlight<T> {
    obj: T,
    result_idx: usize,
    // The kernel reads the timespec when the entry is submitted, which may
    // happen long after the owning future was dropped.
    _tspec: Box<Timespec>,
}

pub(super) struct ReactorInner<T> {
    uring: Option<IoUring>,
    objs: Slab<InFlight<T>>,
    pub results: RingResults,
}

impl<T> ReactorInner<T> {
    pub fn new() -> Self {
        Self {
            uring: None,
            objs: Slab::new(),
            results: RingResults::new(),
        }
    }

    fn ring(&mut self) -> io::Result<&mut IoUring> {
        match &mut self.uring {
            Some(ring) => Ok(ring),
            slot @ None => {
                trace!("creating io_uring with {RING_ENTRIES} entries");
                Ok(slot.insert(IoUring::new(RING_ENTRIES)?))
            }
        }
    }

    pub fn submit_timeout(&mut self, duration: Duration, obj: T) -> io::Result<usize> {
        let tspec = Box::new(
            Timespec::new()
                .sec(duration.as_secs())
                .nsec(duration.subsec_nanos()),
        );
        let entry = opcode::Timeout::new(&*tspec as *const Timespec).build();

        self.ring()?;

        let result_idx = self.results.create_slot();
        let slot = self.objs.insert(InFlight {
            obj,
            result_idx,
            _tspec: tspec,
        });

        if let Err(e) = self.push(entry.user_data(slot as u64)) {
            self.objs.remove(slot);
            self.results.0.remove(result_idx);
            return Err(e);
        }

        Ok(result_idx)
    }

    // Timeouts are measured from submission, so entries are handed to the
    // kernel straight away rather than at the next `react`.
    fn push(&mut self, entry: squeue::Entry) -> io::Result<()> {
        let ring = self.ring()?;

        if unsafe { ring.submission().push(&entry) }.is_err() {
            ring.submit()?;

            unsafe { ring.submission().push(&entry) }
                .map_err(|_| io::Error::from(io::ErrorKind::WouldBlock))?;
        }

        if let Err(e) = ring.submit() {
            warn!("deferring timeout submission to the next react: {e}");
        }

        Ok(())
    }

    pub fn react(&mut self) -> Vec<T> {
        let Some(uring) = self.uring.as_mut() else {
            return Vec::new();
        };

        if let Err(e) = uring.submit_and_wait(1) {
            warn!("io_uring wait failed: {e}");
            return Vec::new();
        }

        let completions = unsafe { uring.completion_shared() };

        completions
            .map(|x| {
                let in_flight = self.objs.remove(x.user_data() as usize);
                self.results.set_result(x.result(), in_flight.result_idx);

                in_flight.obj
            })
            .collect()
    }
}
