// src/crawl/queue.rs
// =============================================================================
// The work queue shared by all crawl workers.
//
// Two jobs live in here:
// 1. Holding the jobs themselves (a VecDeque, first in first out, which is
//    what makes the crawl breadth-first).
// 2. Knowing when the crawl is over. A counter tracks every job that was
//    submitted and not yet completed. Workers submit the children of a page
//    BEFORE they complete the page itself, so the counter can only reach zero
//    when nobody holds work that could still produce more.
//
// Producers never block: `submit` always succeeds (unless the crawl was
// cancelled). How much work gets in is decided earlier, by the visited
// store's admission limit. That rules out the deadlock where every worker is
// stuck pushing into a full queue that nobody is left to drain.
// =============================================================================

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

pub(crate) struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    // Submitted but not yet completed
    pending: AtomicUsize,
    closed: AtomicBool,
    cancelled: AtomicBool,
    // Wakes workers waiting for a job
    work_ready: Notify,
    // Wakes whoever waits in `closed()`
    finished: Notify,
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            work_ready: Notify::new(),
            finished: Notify::new(),
        }
    }

    /// Adds a job. Returns false if the crawl was cancelled.
    pub(crate) fn submit(&self, item: T) -> bool {
        {
            let mut items = self.items.lock();
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            self.pending.fetch_add(1, Ordering::SeqCst);
            items.push_back(item);
        }
        self.work_ready.notify_one();
        true
    }

    /// Waits for the next job. Returns None once the queue is closed.
    pub(crate) async fn next(&self) -> Option<T> {
        loop {
            // Register interest before looking, so a submit that happens
            // between the check and the await still wakes us
            let notified = self.work_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.items.lock().pop_front() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Marks one job as done. The last one closes the queue.
    pub(crate) fn complete(&self) {
        self.finish(1);
    }

    /// Stops accepting work and throws away jobs nobody has started.
    ///
    /// Jobs already being worked on still run to completion; the queue closes
    /// when the last of them completes.
    pub(crate) fn cancel(&self) {
        let dropped = {
            let mut items = self.items.lock();
            self.cancelled.store(true, Ordering::SeqCst);
            let dropped = items.len();
            items.clear();
            dropped
        };

        if dropped > 0 {
            self.finish(dropped);
        } else if self.pending.load(Ordering::SeqCst) == 0 {
            self.close();
        }
    }

    /// Resolves once the queue is closed.
    pub(crate) async fn closed(&self) {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn finish(&self, count: usize) {
        if self.pending.fetch_sub(count, Ordering::SeqCst) == count {
            self.close();
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.work_ready.notify_waiters();
        self.finished.notify_waiters();
    }
}

/// Completes a job when dropped, even if the worker panicked on it.
pub(crate) struct Completion<'a, T>(pub(crate) &'a WorkQueue<T>);

impl<T> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        self.0.complete();
    }
}
