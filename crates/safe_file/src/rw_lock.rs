//! In-process readers-writer lock with the reentrancy the lock-file
//! protocol needs: the writing thread may nest further shared or exclusive
//! acquisitions (and so downgrade), and acquisition can be bounded by a
//! deadline. Acquire and release are explicit rather than guard-based
//! because holds are pushed and popped across separate calls.
//!
//! A thread that only holds the lock shared and asks for it exclusive will
//! wait on itself, like any non-upgradable readers-writer lock. No fairness
//! is guaranteed.

use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::lock::LockMode;

pub(crate) struct ReentrantRwLock {
    state: Mutex<RwState>,
    condvar: Condvar,
}

#[derive(Default)]
struct RwState {
    writer: Option<ThreadId>,
    writer_holds: usize,
    readers: usize,
}

impl RwState {
    fn try_acquire(&mut self, mode: LockMode) -> bool {
        let me = thread::current().id();
        match mode {
            LockMode::Shared => {
                if self.writer.is_none() || self.writer == Some(me) {
                    self.readers += 1;
                    true
                } else {
                    false
                }
            },
            LockMode::Exclusive => {
                if self.writer == Some(me) {
                    self.writer_holds += 1;
                    true
                } else if self.writer.is_none() && self.readers == 0 {
                    self.writer = Some(me);
                    self.writer_holds = 1;
                    true
                } else {
                    false
                }
            },
        }
    }
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        ReentrantRwLock {
            state: Mutex::new(RwState::default()),
            condvar: Condvar::new(),
        }
    }

    pub fn acquire(&self, mode: LockMode) {
        let mut state = self.state.lock();
        while !state.try_acquire(mode) {
            self.condvar.wait(&mut state);
        }
    }

    pub fn try_acquire(&self, mode: LockMode) -> bool {
        self.state.lock().try_acquire(mode)
    }

    pub fn try_acquire_until(&self, mode: LockMode, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while !state.try_acquire(mode) {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                return state.try_acquire(mode);
            }
        }
        true
    }

    /// Releases one hold of the given mode. Returns false when the calling
    /// thread has no such hold to give back.
    pub fn release(&self, mode: LockMode) -> bool {
        let mut state = self.state.lock();
        let released = match mode {
            LockMode::Shared => {
                if state.readers > 0 {
                    state.readers -= 1;
                    true
                } else {
                    false
                }
            },
            LockMode::Exclusive => {
                if state.writer == Some(thread::current().id()) && state.writer_holds > 0 {
                    state.writer_holds -= 1;
                    if state.writer_holds == 0 {
                        state.writer = None;
                    }
                    true
                } else {
                    false
                }
            },
        };
        if released {
            self.condvar.notify_all();
        }
        released
    }
}
