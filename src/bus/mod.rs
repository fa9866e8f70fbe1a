// src/bus/mod.rs

//! The message bus: an indexed table of bounded FIFO channels shared by a
//! set of cooperative tasks.
//!
//! A [`Bus`] owns every channel. Channels are created with [`Bus::open`],
//! addressed through the [`ChannelId`] it returns, and destroyed with
//! [`Bus::close`]. Handles are plain indexes into a sparse table: closing a
//! channel leaves a tombstone behind, and a later `open` reuses the first
//! tombstoned slot, so a handle is only valid between its `open` and its
//! `close`.
//!
//! ### Operation families
//!
//! - **Non-blocking**: [`try_send`](Bus::try_send), [`try_recv`](Bus::try_recv)
//!   and their batch and broadcast counterparts fail with a would-block error
//!   instead of suspending. They never yield to the executor.
//! - **Blocking**: [`send`](Bus::send), [`recv`](Bus::recv),
//!   [`send_many`](Bus::send_many), [`recv_many`](Bus::recv_many) and
//!   [`broadcast`](Bus::broadcast) return futures that park the task in a
//!   per-channel FIFO waiter queue until the operation can make progress or
//!   the channel is closed.
//! - **Batch** operations move as many messages as currently fit and report
//!   the count; partial progress is success, and the caller reissues the
//!   remainder.
//! - **Broadcast** delivers one message to every open channel atomically:
//!   either every open channel accepts it, or none is touched.
//!
//! ### Fairness
//!
//! Waiter queues are strict FIFO. Each freed slot (or published message)
//! wakes exactly the first waiter; a task that must park again joins the
//! tail. Batch transfers wake one waiter per message moved.

use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorKind, TryBroadcastError, TryRecvError, TrySendError};
use crate::Message;

pub use async_impl::{
  BroadcastFuture, CloseFuture, RecvFuture, RecvManyFuture, SendFuture, SendManyFuture,
};

mod async_impl;
mod core;

use self::core::BusShared;

/// Stable identifier of a channel, assigned by [`Bus::open`].
///
/// Ids are small indexes, valid until the channel is closed and eligible for
/// reuse by a later `open`. Operations on a closed id fail with the
/// operation's closed-channel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
  /// The raw slot index behind this id.
  pub fn index(self) -> usize {
    self.0
  }
}

impl fmt::Display for ChannelId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// The bus itself. Cheap to clone; every clone addresses the same channels.
#[derive(Debug, Clone)]
pub struct Bus {
  shared: Arc<BusShared>,
}

impl Default for Bus {
  fn default() -> Self {
    Self::new()
  }
}

impl Bus {
  /// Creates an empty bus with no channels.
  pub fn new() -> Self {
    Bus {
      shared: Arc::new(BusShared::new()),
    }
  }

  /// Opens a new channel holding up to `capacity` messages and returns its
  /// id, reusing the slot of a previously closed channel when one exists.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero. A channel that can never hold a message
  /// cannot make progress under this bus's blocking protocol.
  pub fn open(&self, capacity: usize) -> ChannelId {
    assert!(capacity >= 1, "channel capacity must be at least 1");
    let id = self.shared.internal.lock().insert_channel(capacity);
    self.shared.record(ErrorKind::None);
    log::trace!("opened channel {id} with capacity {capacity}");
    id
  }

  /// Closes a channel, waking every task suspended on it.
  ///
  /// Woken senders and receivers observe the closed channel and fail with
  /// their closed error. The returned future yields once so those tasks get
  /// a scheduler turn before the channel's storage is released. Closing an
  /// id that is unknown or already closed is a silent no-op.
  pub fn close(&self, id: ChannelId) -> CloseFuture<'_> {
    CloseFuture::new(self, id)
  }

  // --- Single-message operations ---

  /// Sends one message, suspending while the channel is full.
  pub fn send(&self, id: ChannelId, value: Message) -> SendFuture<'_> {
    SendFuture::new(self, id, value)
  }

  /// Receives one message, suspending while the channel is empty.
  pub fn recv(&self, id: ChannelId) -> RecvFuture<'_> {
    RecvFuture::new(self, id)
  }

  /// Sends one message if the channel has room, without suspending.
  pub fn try_send(&self, id: ChannelId, value: Message) -> Result<(), TrySendError> {
    self.shared.try_send_core(id, value)
  }

  /// Receives one message if the channel has any, without suspending.
  pub fn try_recv(&self, id: ChannelId) -> Result<Message, TryRecvError> {
    self.shared.try_recv_core(id)
  }

  // --- Batch operations ---

  /// Sends a batch, suspending while the channel is full.
  ///
  /// Resolves to the number of messages accepted from the front of `values`
  /// (at least one for a non-empty input, possibly fewer than all); the
  /// caller reissues the remainder. One receiver is woken per message.
  pub fn send_many<'a>(&'a self, id: ChannelId, values: &'a [Message]) -> SendManyFuture<'a> {
    SendManyFuture::new(self, id, values)
  }

  /// Receives a batch into `buf`, suspending while the channel is empty.
  ///
  /// Resolves to the number of messages written to the front of `buf` (at
  /// least one for a non-empty buffer). One sender is woken per message.
  pub fn recv_many<'a>(&'a self, id: ChannelId, buf: &'a mut [Message]) -> RecvManyFuture<'a> {
    RecvManyFuture::new(self, id, buf)
  }

  /// Non-suspending [`send_many`](Bus::send_many): fails with
  /// [`TrySendError::Full`] instead of parking, accepting nothing in that
  /// case.
  pub fn try_send_many(&self, id: ChannelId, values: &[Message]) -> Result<usize, TrySendError> {
    self.shared.try_send_many_core(id, values)
  }

  /// Non-suspending [`recv_many`](Bus::recv_many): fails with
  /// [`TryRecvError::Empty`] instead of parking.
  pub fn try_recv_many(&self, id: ChannelId, buf: &mut [Message]) -> Result<usize, TryRecvError> {
    self.shared.try_recv_many_core(id, buf)
  }

  // --- Broadcast ---

  /// Delivers `value` to every open channel, suspending while any of them
  /// is full.
  ///
  /// Delivery is all-or-nothing per attempt and happens in handle order.
  /// Fails only when the bus has no open channels left.
  pub fn broadcast(&self, value: Message) -> BroadcastFuture<'_> {
    BroadcastFuture::new(self, value)
  }

  /// Non-suspending [`broadcast`](Bus::broadcast). If any open channel is
  /// full, no channel is touched.
  pub fn try_broadcast(&self, value: Message) -> Result<(), TryBroadcastError> {
    self.shared.try_broadcast_core(value)
  }

  // --- Error state ---

  /// The classification recorded by the most recent fallible operation on
  /// this bus: [`ErrorKind::None`] after a success, the specific kind after
  /// a failure. Not cleared between calls.
  pub fn last_error(&self) -> ErrorKind {
    self.shared.last_error()
  }

  /// Overwrites the recorded error state. Mostly useful for tests and for
  /// adapters that re-export the errno-style surface.
  pub fn set_last_error(&self, kind: ErrorKind) {
    self.shared.record(kind);
  }

  // --- Introspection ---

  /// Whether `id` names an open channel.
  pub fn is_open(&self, id: ChannelId) -> bool {
    self.shared.internal.lock().channel(id).is_some()
  }

  /// Number of currently open channels.
  pub fn channel_count(&self) -> usize {
    self.shared.internal.lock().open_count()
  }

  /// Number of messages queued in a channel, or `None` if it is closed.
  pub fn len(&self, id: ChannelId) -> Option<usize> {
    self
      .shared
      .internal
      .lock()
      .channel(id)
      .map(|chan| chan.ring.len())
  }

  /// Capacity of a channel, or `None` if it is closed.
  pub fn capacity(&self, id: ChannelId) -> Option<usize> {
    self
      .shared
      .internal
      .lock()
      .channel(id)
      .map(|chan| chan.ring.capacity())
  }

  /// Whether a channel holds no messages, or `None` if it is closed.
  pub fn is_empty(&self, id: ChannelId) -> Option<bool> {
    self
      .shared
      .internal
      .lock()
      .channel(id)
      .map(|chan| chan.ring.is_empty())
  }

  /// Whether a channel is at capacity, or `None` if it is closed.
  pub fn is_full(&self, id: ChannelId) -> Option<bool> {
    self
      .shared
      .internal
      .lock()
      .channel(id)
      .map(|chan| chan.ring.is_full())
  }
}
