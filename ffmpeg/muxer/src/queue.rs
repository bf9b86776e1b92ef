/*!
    Serialized work queue with a single consumer.
*/

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/**
    FIFO queue drained by exactly one consumer.

    Before [`WorkQueue::start`] additions are buffered without bound. Once
    started, [`WorkQueue::add`] blocks while the queue holds `capacity`
    items. After [`WorkQueue::stop`] new items are rejected, but everything
    already accepted is still handed to the consumer.
*/
pub struct WorkQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    started: bool,
    stopped: bool,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                capacity: capacity.max(1),
                started: false,
                stopped: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /**
        Add an item, blocking while a started queue is full.
        Returns false if the queue was stopped and the item rejected.
    */
    pub fn add(&self, item: T) -> bool {
        let mut inner = self.inner.lock();

        while inner.started && !inner.stopped && inner.items.len() >= inner.capacity {
            self.not_full.wait(&mut inner);
        }

        if inner.stopped {
            return false;
        }

        inner.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /**
        Switch to bounded mode. Buffered items stay queued.
    */
    pub fn start(&self) {
        self.inner.lock().started = true;
    }

    /**
        Take the next item, blocking while the queue is empty.
        Returns None once the queue is stopped and drained.
    */
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();

        while inner.items.is_empty() && !inner.stopped {
            self.not_empty.wait(&mut inner);
        }

        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /**
        Start the queue and hand every item to `handle` until stopped and drained.
    */
    pub fn run<F>(&self, mut handle: F)
    where
        F: FnMut(T),
    {
        self.start();
        while let Some(item) = self.pop() {
            handle(item);
        }
    }

    /**
        Reject new items and wake every waiter.
    */
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /**
        Drop every pending item, returning how many were dropped.
    */
    pub fn discard(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.items.len();
        inner.items.clear();
        self.not_full.notify_all();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
