//! Pending message queue shared by submitters and the dispatcher

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use vtspi_core::{Message, SpiDevice};

/// Work for the dispatcher, with the device snapshot it was queued for
pub(crate) enum Job {
    /// Execute a message
    Message { device: SpiDevice, message: Message },
    /// Drive the device's select line to its inactive level
    Release(SpiDevice),
}

#[derive(Default)]
struct State {
    pending: VecDeque<Job>,
    active: bool,
    stopping: bool,
}

/// FIFO of jobs plus the dispatcher's wakeup
#[derive(Default)]
pub(crate) struct Queue {
    state: Mutex<State>,
    wake: Condvar,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append and wake the dispatcher under the same lock
    pub fn push(&self, job: Job) {
        let mut state = self.lock();
        state.pending.push_back(job);
        self.wake.notify_one();
    }

    /// Block until there is a job, or `None` once stopped and empty
    pub fn next(&self) -> Option<Job> {
        let mut state = self.lock();
        loop {
            if let Some(job) = state.pending.pop_front() {
                state.active = true;
                return Some(job);
            }
            if state.stopping {
                return None;
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The dispatcher finished the job it took last
    pub fn finish(&self) {
        self.lock().active = false;
    }

    /// Nothing queued and nothing executing
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && !state.active
    }

    /// Jobs waiting, not counting the one executing
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Let the dispatcher exit once the queue is empty
    pub fn stop(&self) {
        self.lock().stopping = true;
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use vtspi_core::Transfer;

    fn job(len: usize) -> Job {
        Job::Message {
            device: SpiDevice::new(0),
            message: Message::new().with_transfer(Transfer::write(vec![0; len])),
        }
    }

    fn len_of(job: Job) -> usize {
        match job {
            Job::Message { message, .. } => message.transfers()[0].len(),
            Job::Release(_) => 0,
        }
    }

    #[test]
    fn test_fifo_order_and_idle() {
        let queue = Queue::default();
        queue.push(job(1));
        queue.push(job(2));
        assert_eq!(queue.len(), 2);

        assert_eq!(len_of(queue.next().unwrap()), 1);
        assert!(!queue.is_idle());
        queue.finish();
        assert!(!queue.is_idle());

        assert_eq!(len_of(queue.next().unwrap()), 2);
        queue.finish();
        assert!(queue.is_idle());
    }

    #[test]
    fn test_stop_drains_first() {
        let queue = Arc::new(Queue::default());
        queue.push(job(3));
        queue.stop();
        assert!(queue.next().is_some());
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_push_wakes_waiter() {
        let queue = Arc::new(Queue::default());
        let worker = {
            let queue = queue.clone();
            thread::spawn(move || queue.next().map(len_of))
        };
        queue.push(job(7));
        assert_eq!(worker.join().unwrap(), Some(7));
    }
}
