// src/bus/core.rs

//! The shared interior of the bus.
//!
//! One `parking_lot::Mutex` guards the whole channel table, every ring and
//! both waiter queues of every channel. Each operation completes all of its
//! mutations inside a single lock acquisition, so no task ever observes a
//! channel in a half-updated state and composite operations (batch transfer,
//! broadcast) are atomic with respect to every other bus operation. Under a
//! cooperative single-threaded executor the lock is never contended; it
//! exists to provide interior mutability behind `&self` and to keep the same
//! code sound on a threaded executor.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::error::{ErrorKind, TryBroadcastError, TryRecvError, TrySendError};
use crate::internal::ring::RingBuf;
use crate::internal::waiter::WaiterQueue;
use crate::Message;

use super::ChannelId;

/// Slot-table growth: start small, double up to the knee, then grow by a
/// quarter to bound waste on large buses.
const TABLE_INITIAL_CAPACITY: usize = 4;
const TABLE_DOUBLING_LIMIT: usize = 1024;

/// One open channel: its ring plus the two waiter queues.
#[derive(Debug)]
pub(crate) struct Channel {
  pub(crate) ring: RingBuf,
  /// Tasks suspended until the ring is no longer full.
  pub(crate) send_waiters: WaiterQueue,
  /// Tasks suspended until the ring is no longer empty.
  pub(crate) recv_waiters: WaiterQueue,
}

impl Channel {
  fn new(capacity: usize) -> Self {
    Channel {
      ring: RingBuf::with_capacity(capacity),
      send_waiters: WaiterQueue::new(),
      recv_waiters: WaiterQueue::new(),
    }
  }
}

/// The channel table. Closed channels leave a `None` tombstone behind;
/// `insert_channel` reuses the first tombstone before appending.
#[derive(Debug)]
pub(crate) struct BusInternal {
  pub(crate) slots: Vec<Option<Channel>>,
}

impl BusInternal {
  fn new() -> Self {
    BusInternal { slots: Vec::new() }
  }

  pub(crate) fn channel(&self, id: ChannelId) -> Option<&Channel> {
    self.slots.get(id.0).and_then(Option::as_ref)
  }

  pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
    self.slots.get_mut(id.0).and_then(Option::as_mut)
  }

  /// Tombstones the slot and hands the channel record to the caller.
  pub(crate) fn take_channel(&mut self, id: ChannelId) -> Option<Channel> {
    self.slots.get_mut(id.0).and_then(Option::take)
  }

  pub(crate) fn open_count(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  pub(crate) fn insert_channel(&mut self, capacity: usize) -> ChannelId {
    if let Some(idx) = self.slots.iter().position(Option::is_none) {
      self.slots[idx] = Some(Channel::new(capacity));
      return ChannelId(idx);
    }
    if self.slots.len() == self.slots.capacity() {
      let target = match self.slots.capacity() {
        0 => TABLE_INITIAL_CAPACITY,
        cap if cap <= TABLE_DOUBLING_LIMIT => cap * 2,
        cap => cap + cap / 4,
      };
      self.slots.reserve_exact(target - self.slots.len());
    }
    self.slots.push(Some(Channel::new(capacity)));
    ChannelId(self.slots.len() - 1)
  }
}

/// The `Arc`-shared owner of all bus state.
#[derive(Debug)]
pub(crate) struct BusShared {
  pub(crate) internal: Mutex<BusInternal>,
  /// `ErrorKind` discriminant of the most recent fallible operation.
  last_error: AtomicU8,
}

impl Drop for BusShared {
  fn drop(&mut self) {
    let open = self.internal.get_mut().open_count();
    log::trace!("bus dropped with {open} channel(s) still open");
  }
}

impl BusShared {
  pub(crate) fn new() -> Self {
    BusShared {
      internal: Mutex::new(BusInternal::new()),
      last_error: AtomicU8::new(ErrorKind::None as u8),
    }
  }

  pub(crate) fn record(&self, kind: ErrorKind) {
    self.last_error.store(kind as u8, Ordering::Release);
  }

  pub(crate) fn last_error(&self) -> ErrorKind {
    ErrorKind::from_u8(self.last_error.load(Ordering::Acquire))
  }

  pub(crate) fn try_send_core(&self, id: ChannelId, value: Message) -> Result<(), TrySendError> {
    let mut guard = self.internal.lock();
    let Some(chan) = guard.channel_mut(id) else {
      self.record(ErrorKind::NoChannel);
      return Err(TrySendError::Closed);
    };
    if chan.ring.is_full() {
      self.record(ErrorKind::WouldBlock);
      return Err(TrySendError::Full);
    }
    // Publish the message before the wake so a woken receiver observes it.
    chan.ring.push_back(value);
    chan.recv_waiters.wake_first();
    self.record(ErrorKind::None);
    Ok(())
  }

  pub(crate) fn try_recv_core(&self, id: ChannelId) -> Result<Message, TryRecvError> {
    let mut guard = self.internal.lock();
    let Some(chan) = guard.channel_mut(id) else {
      self.record(ErrorKind::NoChannel);
      return Err(TryRecvError::Closed);
    };
    if chan.ring.is_empty() {
      self.record(ErrorKind::WouldBlock);
      return Err(TryRecvError::Empty);
    }
    let value = chan.ring.pop_front();
    chan.send_waiters.wake_first();
    self.record(ErrorKind::None);
    Ok(value)
  }

  /// Transfers up to `values.len()` messages, one wake per message accepted.
  ///
  /// An empty input is a successful no-op. A full ring rejects the whole
  /// batch; otherwise at least one message is accepted.
  pub(crate) fn try_send_many_core(
    &self,
    id: ChannelId,
    values: &[Message],
  ) -> Result<usize, TrySendError> {
    let mut guard = self.internal.lock();
    let Some(chan) = guard.channel_mut(id) else {
      self.record(ErrorKind::NoChannel);
      return Err(TrySendError::Closed);
    };
    if values.is_empty() {
      self.record(ErrorKind::None);
      return Ok(0);
    }
    if chan.ring.is_full() {
      self.record(ErrorKind::WouldBlock);
      return Err(TrySendError::Full);
    }
    let count = values.len().min(chan.ring.free());
    for &value in &values[..count] {
      chan.ring.push_back(value);
    }
    // One wake per message, so each pending receiver claims exactly one.
    for _ in 0..count {
      chan.recv_waiters.wake_first();
    }
    self.record(ErrorKind::None);
    Ok(count)
  }

  pub(crate) fn try_recv_many_core(
    &self,
    id: ChannelId,
    buf: &mut [Message],
  ) -> Result<usize, TryRecvError> {
    let mut guard = self.internal.lock();
    let Some(chan) = guard.channel_mut(id) else {
      self.record(ErrorKind::NoChannel);
      return Err(TryRecvError::Closed);
    };
    if buf.is_empty() {
      self.record(ErrorKind::None);
      return Ok(0);
    }
    if chan.ring.is_empty() {
      self.record(ErrorKind::WouldBlock);
      return Err(TryRecvError::Empty);
    }
    let count = buf.len().min(chan.ring.len());
    for slot in &mut buf[..count] {
      *slot = chan.ring.pop_front();
    }
    for _ in 0..count {
      chan.send_waiters.wake_first();
    }
    self.record(ErrorKind::None);
    Ok(count)
  }

  /// Delivers `value` to every open channel, or to none at all.
  ///
  /// The capacity pre-check and the delivery pass run under one lock
  /// acquisition, so no other operation can interleave between them.
  pub(crate) fn try_broadcast_core(&self, value: Message) -> Result<(), TryBroadcastError> {
    let mut guard = self.internal.lock();
    let mut open_seen = false;
    let mut any_full = false;
    for chan in guard.slots.iter().filter_map(Option::as_ref) {
      open_seen = true;
      if chan.ring.is_full() {
        any_full = true;
        break;
      }
    }
    if !open_seen {
      self.record(ErrorKind::NoChannel);
      return Err(TryBroadcastError::NoChannels);
    }
    if any_full {
      self.record(ErrorKind::WouldBlock);
      return Err(TryBroadcastError::Full);
    }
    for chan in guard.slots.iter_mut().filter_map(Option::as_mut) {
      chan.ring.push_back(value);
      chan.recv_waiters.wake_first();
    }
    self.record(ErrorKind::None);
    Ok(())
  }
}
