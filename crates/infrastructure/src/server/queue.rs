use super::task::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// At capacity; the datagram is dropped (back-pressure).
    Full,
    /// Queue closed for shutdown.
    Closed,
}

/// Outcome of a bounded-wait pop.
#[derive(Debug)]
pub enum Pop {
    Task(Task),
    TimedOut,
    Closed,
}

struct Inner {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// Bounded FIFO between the dispatcher and the workers.
///
/// The dispatcher pushes without blocking and drops on overflow; workers pop
/// with a bounded wait so they can observe shutdown. Two condition variables
/// keep producer and consumer wakeups apart.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::with_capacity(capacity.min(4096)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Non-blocking enqueue; the dispatcher's default path.
    pub fn push(&self, task: Task) -> Result<(), PushError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed);
        }
        if inner.tasks.len() >= self.capacity {
            return Err(PushError::Full);
        }
        inner.tasks.push_back(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocking enqueue, waiting for space. Only refuses when closed.
    pub fn push_wait(&self, task: Task) -> Result<(), PushError> {
        let mut inner = self.inner.lock();
        while inner.tasks.len() >= self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(PushError::Closed);
        }
        inner.tasks.push_back(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue with a bounded wait. Returns `TimedOut` so callers can check
    /// the shutdown flag between waits.
    pub fn pop(&self, timeout: Duration) -> Pop {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.tasks.pop_front() {
                self.not_full.notify_one();
                return Pop::Task(task);
            }
            if inner.closed {
                return Pop::Closed;
            }
            if self.not_empty.wait_for(&mut inner, timeout).timed_out() {
                return match inner.tasks.pop_front() {
                    Some(task) => {
                        self.not_full.notify_one();
                        Pop::Task(task)
                    }
                    None if inner.closed => Pop::Closed,
                    None => Pop::TimedOut,
                };
            }
        }
    }

    /// Mark closed and wake everyone. Tasks already queued (including
    /// shutdown pills) remain poppable.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
