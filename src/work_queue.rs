//! Priority work queue: two FIFOs -- high and low -- guarded by a
//! mutex, with a pull policy of two-from-high per one-from-low and a
//! fallthrough to whichever queue is non-empty when the preferred one
//! isn't. Every push wakes a waiting worker; pause/resume lets a
//! diagnostic pass stop workers at safe points.
//!
//! The original uses a raw semaphore and POSIX threads; `parking_lot`'s
//! `Condvar` gives the same wait/notify shape without hand-rolling a
//! semaphore, consistent with this crate's use of `parking_lot` for every
//! other lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

struct Inner {
    high: VecDeque<Job>,
    low: VecDeque<Job>,
    /// Counts consecutive pulls from `high` in the current 2-high/1-low
    /// cycle; reset to 0 after a low pull (or a fallthrough).
    high_streak: u8,
}

/// Shared handle; clone and hand one to each worker thread plus the
/// submitter.
pub struct PriorityWorkQueue {
    inner: Mutex<Inner>,
    cond: Condvar,
    paused: AtomicBool,
    stopped: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl PriorityWorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(PriorityWorkQueue {
            inner: Mutex::new(Inner { high: VecDeque::new(), low: VecDeque::new(), high_streak: 0 }),
            cond: Condvar::new(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    pub fn push(&self, priority: Priority, job: Job) {
        let mut inner = self.inner.lock();
        match priority {
            Priority::High => inner.high.push_back(job),
            Priority::Low => inner.low.push_back(job),
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.cond.notify_one();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.high.len() + inner.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }

    /// Blocks until a job is available and the queue is not paused, a
    /// safe point is reached, or the queue is stopped (returns `None`).
    /// Applies the 2-high/1-low pull policy, falling through to whichever
    /// queue is non-empty when the preferred one is drained.
    pub fn pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }
            if !self.paused.load(Ordering::SeqCst) {
                if let Some(job) = Self::try_take(&mut inner) {
                    return Some(job);
                }
            }
            self.cond.wait(&mut inner);
        }
    }

    fn try_take(inner: &mut Inner) -> Option<Job> {
        let prefer_high = inner.high_streak < 2;
        if prefer_high {
            if let Some(job) = inner.high.pop_front() {
                inner.high_streak += 1;
                return Some(job);
            }
            if let Some(job) = inner.low.pop_front() {
                inner.high_streak = 0;
                return Some(job);
            }
        } else {
            if let Some(job) = inner.low.pop_front() {
                inner.high_streak = 0;
                return Some(job);
            }
            if let Some(job) = inner.high.pop_front() {
                inner.high_streak += 1;
                return Some(job);
            }
        }
        None
    }

    pub fn mark_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub pending: usize,
}
