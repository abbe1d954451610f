use crossbeam::queue::SegQueue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::model::{Task, WorkerId};

/// A lock-free pull-queue shared by the worker pool.
///
/// Seeded once before workers start; `try_claim` is a non-blocking pop, and a
/// task is handed to exactly one claimant even under concurrent calls.
pub struct WorkQueue<T> {
    queue: SegQueue<T>,
    size: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            size: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, item: T) {
        self.size.fetch_add(1, Ordering::AcqRel);
        self.queue.push(item);
    }

    pub fn try_claim(&self) -> Option<T> {
        match self.queue.pop() {
            Some(item) => {
                self.size.fetch_sub(1, Ordering::AcqRel);
                Some(item)
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands pending tasks to workers.
///
/// With one worker the full list is statically owned by that worker; with a
/// pool, all workers pull from one shared queue. An empty claim tells the
/// worker to terminate its loop, not to retry.
pub enum Distributor {
    Partition(Mutex<VecDeque<Task>>),
    Shared(WorkQueue<Task>),
}

impl Distributor {
    pub fn new(tasks: Vec<Task>, workers: usize) -> Self {
        if workers <= 1 {
            Distributor::Partition(Mutex::new(tasks.into()))
        } else {
            let queue = WorkQueue::new();
            for task in tasks {
                queue.push(task);
            }
            Distributor::Shared(queue)
        }
    }

    pub fn try_claim(&self, _worker: WorkerId) -> Option<Task> {
        match self {
            Distributor::Partition(list) => list.lock().ok()?.pop_front(),
            Distributor::Shared(queue) => queue.try_claim(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self {
            Distributor::Partition(list) => list.lock().map(|l| l.len()).unwrap_or(0),
            Distributor::Shared(queue) => queue.len(),
        }
    }
}
