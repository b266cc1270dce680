//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::status::{RmError, RmResult};

/// Per-device queue of deferred asynchronous work.
pub trait WorkQueue: Send + Sync {
    /// Block until every item queued before the call has completed.
    fn flush(&self) -> RmResult<()>;
}

type WorkItem = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkItem>,
    /// Items popped by a flusher that have not finished yet.
    active: usize,
    closed: bool,
}

/// Work queue whose items run on the flushing thread.
pub struct DeferredWorkQueue {
    name: String,
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl DeferredWorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
        }
    }

    /// Queue `work`; dropped with a warning once the queue has been closed.
    pub fn enqueue<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.closed {
            warn!(queue = %self.name, "work item dropped; queue closed");
            return;
        }
        state.pending.push_back(Box::new(work));
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Refuse further work. Pending items are discarded and later flushes fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.pending.len();
        state.pending.clear();
        drop(state);
        self.idle.notify_all();
        debug!(queue = %self.name, dropped, "work queue closed");
    }
}

impl WorkQueue for DeferredWorkQueue {
    fn flush(&self) -> RmResult<()> {
        let mut ran = 0usize;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(RmError::InvalidState);
            }
            if let Some(work) = state.pending.pop_front() {
                state.active += 1;
                // Items run with the queue unlocked so they can enqueue follow-up work.
                MutexGuard::unlocked(&mut state, work);
                state.active -= 1;
                ran += 1;
                self.idle.notify_all();
            } else if state.active > 0 {
                // Another flusher is still running an item queued before this call.
                self.idle.wait(&mut state);
            } else {
                break;
            }
        }
        drop(state);
        debug!(queue = %self.name, ran, "work queue flushed");
        Ok(())
    }
}

impl std::fmt::Debug for DeferredWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredWorkQueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn flush_drains_items_in_order() {
        let queue = DeferredWorkQueue::new("gpu0");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            queue.enqueue(move || seen.lock().push(i));
        }
        assert_eq!(queue.pending(), 3);
        queue.flush().unwrap();
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn work_queued_during_flush_is_drained_too() {
        let queue = Arc::new(DeferredWorkQueue::new("gpu0"));
        let count = Arc::new(AtomicUsize::new(0));
        {
            let inner_queue = Arc::clone(&queue);
            let count = Arc::clone(&count);
            queue.enqueue(move || {
                count.fetch_add(1, Ordering::SeqCst);
                let count = Arc::clone(&count);
                inner_queue.enqueue(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                });
            });
        }
        queue.flush().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_flush_waits_for_item_running_elsewhere() {
        let queue = Arc::new(DeferredWorkQueue::new("gpu0"));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = mpsc::channel();
        {
            let finished = Arc::clone(&finished);
            queue.enqueue(move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            });
        }

        let first = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.flush())
        };
        started_rx.recv().unwrap();
        assert_eq!(queue.pending(), 0);

        queue.flush().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        first.join().unwrap().unwrap();
    }

    #[test]
    fn close_wakes_waiting_flusher() {
        let queue = Arc::new(DeferredWorkQueue::new("gpu0"));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        queue.enqueue(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });

        let first = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.flush())
        };
        started_rx.recv().unwrap();
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.flush())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(waiter.join().unwrap(), Err(RmError::InvalidState));

        release_tx.send(()).unwrap();
        assert_eq!(first.join().unwrap(), Err(RmError::InvalidState));
    }

    #[test]
    fn closed_queue_rejects_flush() {
        let queue = DeferredWorkQueue::new("gpu0");
        queue.enqueue(|| {});
        queue.close();
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.flush(), Err(RmError::InvalidState));
    }
}
