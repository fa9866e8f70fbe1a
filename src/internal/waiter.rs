// src/internal/waiter.rs

//! Waiter records and per-channel FIFO waiter queues.
//!
//! A suspended operation owns exactly one [`Waiter`], shared with the queue
//! it is parked in. Whichever side removes the record from the queue sets its
//! `released` flag: the normal path is a counterpart operation (or a channel
//! close) popping the head, flagging it, and waking the stored waker. The
//! owner only touches the queue itself when its future is dropped while the
//! record is still linked.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;

use parking_lot::Mutex;

/// One suspended task's reservation in a waiter queue.
#[derive(Debug)]
pub(crate) struct Waiter {
  waker: Mutex<Option<Waker>>,
  released: AtomicBool,
}

impl Waiter {
  pub(crate) fn new(waker: Waker) -> Arc<Self> {
    Arc::new(Waiter {
      waker: Mutex::new(Some(waker)),
      released: AtomicBool::new(false),
    })
  }

  /// Re-arms the record with a fresh waker.
  ///
  /// Returns `false` if the record was already released, in which case the
  /// caller must not park and should retry its operation instead.
  pub(crate) fn register(&self, waker: &Waker) -> bool {
    let mut slot = self.waker.lock();
    if self.released.load(Ordering::Acquire) {
      return false;
    }
    match &*slot {
      Some(current) if current.will_wake(waker) => {}
      _ => *slot = Some(waker.clone()),
    }
    true
  }

  /// True once a waker has unlinked this record from its queue.
  pub(crate) fn is_released(&self) -> bool {
    self.released.load(Ordering::Acquire)
  }

  /// Marks the record as removed by the waker and wakes its owner.
  pub(crate) fn release(&self) {
    self.released.store(true, Ordering::Release);
    let waker = self.waker.lock().take();
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

/// Strict FIFO queue of waiter records.
pub(crate) struct WaiterQueue {
  waiters: VecDeque<Arc<Waiter>>,
}

impl fmt::Debug for WaiterQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WaiterQueue")
      .field("len", &self.waiters.len())
      .finish()
  }
}

impl WaiterQueue {
  pub(crate) fn new() -> Self {
    WaiterQueue {
      waiters: VecDeque::new(),
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.waiters.is_empty()
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.waiters.len()
  }

  /// Appends a record at the tail. A task that must suspend again after a
  /// wakeup re-enters here, behind every waiter that arrived in between.
  pub(crate) fn enqueue(&mut self, waiter: Arc<Waiter>) {
    self.waiters.push_back(waiter);
  }

  /// Releases the head record, if any. No-op on an empty queue.
  pub(crate) fn wake_first(&mut self) {
    if let Some(waiter) = self.waiters.pop_front() {
      waiter.release();
    }
  }

  /// Unlinks every record without waking. The caller releases them in order,
  /// typically after dropping the lock that guards this queue.
  pub(crate) fn take_all(&mut self) -> VecDeque<Arc<Waiter>> {
    std::mem::take(&mut self.waiters)
  }

  /// Owner-side removal of a specific record, by identity.
  ///
  /// Used when a suspended future is dropped before its wakeup arrives. No-op
  /// if the record is no longer linked here.
  pub(crate) fn unlink(&mut self, waiter: &Arc<Waiter>) {
    if let Some(pos) = self.waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
      self.waiters.remove(pos);
    }
  }
}
