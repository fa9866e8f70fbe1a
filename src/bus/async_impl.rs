// src/bus/async_impl.rs

//! The blocking bus operations, implemented as futures.
//!
//! Every future runs the same retry protocol: attempt the operation; if it
//! would block, create a waiter, link it at the tail of the relevant queue
//! and return `Poll::Pending`, all under one lock acquisition so the wakeup
//! that frees the task cannot slip in between the check and the park. A
//! released waiter means "retry", not "done": the woken task re-runs the
//! attempt and, if another task claimed the slot first, parks again at the
//! tail.
//!
//! Futures are droppable at any point. A future dropped while its waiter is
//! still linked unlinks it; one dropped after its waiter was released (woken
//! but never re-polled) passes the wakeup on to the next waiter in the same
//! queue, so a freed slot or a published message is never stranded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::{BroadcastError, ErrorKind, RecvError, SendError};
use crate::internal::waiter::Waiter;
use crate::Message;

use super::{Bus, ChannelId};

// --- SendFuture ---

/// Future returned by [`Bus::send`]. Completes once the message is in the
/// channel, or fails with [`SendError::Closed`] if the channel goes away.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct SendFuture<'a> {
  bus: &'a Bus,
  id: ChannelId,
  value: Message,
  waiter: Option<Arc<Waiter>>,
}

impl<'a> SendFuture<'a> {
  pub(super) fn new(bus: &'a Bus, id: ChannelId, value: Message) -> Self {
    SendFuture {
      bus,
      id,
      value,
      waiter: None,
    }
  }
}

impl Future for SendFuture<'_> {
  type Output = Result<(), SendError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if let Some(waiter) = this.waiter.take() {
      if waiter.register(cx.waker()) {
        // Still linked; nothing changed since we parked.
        this.waiter = Some(waiter);
        return Poll::Pending;
      }
    }

    let shared = &this.bus.shared;
    let mut guard = shared.internal.lock();
    let Some(chan) = guard.channel_mut(this.id) else {
      drop(guard);
      shared.record(ErrorKind::NoChannel);
      return Poll::Ready(Err(SendError::Closed));
    };
    if !chan.ring.is_full() {
      chan.ring.push_back(this.value);
      chan.recv_waiters.wake_first();
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(()));
    }
    let waiter = Waiter::new(cx.waker().clone());
    chan.send_waiters.enqueue(Arc::clone(&waiter));
    drop(guard);
    shared.record(ErrorKind::WouldBlock);
    this.waiter = Some(waiter);
    Poll::Pending
  }
}

impl Drop for SendFuture<'_> {
  fn drop(&mut self) {
    let Some(waiter) = self.waiter.take() else {
      return;
    };
    let mut guard = self.bus.shared.internal.lock();
    let Some(chan) = guard.channel_mut(self.id) else {
      return;
    };
    if waiter.is_released() {
      // Woken to claim a slot this task will never use: pass it on.
      chan.send_waiters.wake_first();
    } else {
      chan.send_waiters.unlink(&waiter);
    }
  }
}

// --- RecvFuture ---

/// Future returned by [`Bus::recv`]. Resolves to the oldest message in the
/// channel, or [`RecvError::Closed`] if the channel goes away.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct RecvFuture<'a> {
  bus: &'a Bus,
  id: ChannelId,
  waiter: Option<Arc<Waiter>>,
}

impl<'a> RecvFuture<'a> {
  pub(super) fn new(bus: &'a Bus, id: ChannelId) -> Self {
    RecvFuture {
      bus,
      id,
      waiter: None,
    }
  }
}

impl Future for RecvFuture<'_> {
  type Output = Result<Message, RecvError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if let Some(waiter) = this.waiter.take() {
      if waiter.register(cx.waker()) {
        this.waiter = Some(waiter);
        return Poll::Pending;
      }
    }

    let shared = &this.bus.shared;
    let mut guard = shared.internal.lock();
    let Some(chan) = guard.channel_mut(this.id) else {
      drop(guard);
      shared.record(ErrorKind::NoChannel);
      return Poll::Ready(Err(RecvError::Closed));
    };
    if !chan.ring.is_empty() {
      let value = chan.ring.pop_front();
      chan.send_waiters.wake_first();
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(value));
    }
    let waiter = Waiter::new(cx.waker().clone());
    chan.recv_waiters.enqueue(Arc::clone(&waiter));
    drop(guard);
    shared.record(ErrorKind::WouldBlock);
    this.waiter = Some(waiter);
    Poll::Pending
  }
}

impl Drop for RecvFuture<'_> {
  fn drop(&mut self) {
    let Some(waiter) = self.waiter.take() else {
      return;
    };
    let mut guard = self.bus.shared.internal.lock();
    let Some(chan) = guard.channel_mut(self.id) else {
      return;
    };
    if waiter.is_released() {
      chan.recv_waiters.wake_first();
    } else {
      chan.recv_waiters.unlink(&waiter);
    }
  }
}

// --- SendManyFuture ---

/// Future returned by [`Bus::send_many`]. Resolves to the number of messages
/// accepted (at least one for a non-empty input); the caller reissues the
/// remainder. An empty input resolves to `Ok(0)` immediately.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct SendManyFuture<'a> {
  bus: &'a Bus,
  id: ChannelId,
  values: &'a [Message],
  waiter: Option<Arc<Waiter>>,
}

impl<'a> SendManyFuture<'a> {
  pub(super) fn new(bus: &'a Bus, id: ChannelId, values: &'a [Message]) -> Self {
    SendManyFuture {
      bus,
      id,
      values,
      waiter: None,
    }
  }
}

impl Future for SendManyFuture<'_> {
  type Output = Result<usize, SendError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if let Some(waiter) = this.waiter.take() {
      if waiter.register(cx.waker()) {
        this.waiter = Some(waiter);
        return Poll::Pending;
      }
    }

    let shared = &this.bus.shared;
    let mut guard = shared.internal.lock();
    let Some(chan) = guard.channel_mut(this.id) else {
      drop(guard);
      shared.record(ErrorKind::NoChannel);
      return Poll::Ready(Err(SendError::Closed));
    };
    if this.values.is_empty() {
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(0));
    }
    if !chan.ring.is_full() {
      let count = this.values.len().min(chan.ring.free());
      for &value in &this.values[..count] {
        chan.ring.push_back(value);
      }
      for _ in 0..count {
        chan.recv_waiters.wake_first();
      }
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(count));
    }
    let waiter = Waiter::new(cx.waker().clone());
    chan.send_waiters.enqueue(Arc::clone(&waiter));
    drop(guard);
    shared.record(ErrorKind::WouldBlock);
    this.waiter = Some(waiter);
    Poll::Pending
  }
}

impl Drop for SendManyFuture<'_> {
  fn drop(&mut self) {
    let Some(waiter) = self.waiter.take() else {
      return;
    };
    let mut guard = self.bus.shared.internal.lock();
    let Some(chan) = guard.channel_mut(self.id) else {
      return;
    };
    if waiter.is_released() {
      chan.send_waiters.wake_first();
    } else {
      chan.send_waiters.unlink(&waiter);
    }
  }
}

// --- RecvManyFuture ---

/// Future returned by [`Bus::recv_many`]. Fills a prefix of the caller's
/// buffer and resolves to the number of messages received (at least one for
/// a non-empty buffer). An empty buffer resolves to `Ok(0)` immediately.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct RecvManyFuture<'a> {
  bus: &'a Bus,
  id: ChannelId,
  buf: &'a mut [Message],
  waiter: Option<Arc<Waiter>>,
}

impl<'a> RecvManyFuture<'a> {
  pub(super) fn new(bus: &'a Bus, id: ChannelId, buf: &'a mut [Message]) -> Self {
    RecvManyFuture {
      bus,
      id,
      buf,
      waiter: None,
    }
  }
}

impl Future for RecvManyFuture<'_> {
  type Output = Result<usize, RecvError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if let Some(waiter) = this.waiter.take() {
      if waiter.register(cx.waker()) {
        this.waiter = Some(waiter);
        return Poll::Pending;
      }
    }

    let shared = &this.bus.shared;
    let mut guard = shared.internal.lock();
    let Some(chan) = guard.channel_mut(this.id) else {
      drop(guard);
      shared.record(ErrorKind::NoChannel);
      return Poll::Ready(Err(RecvError::Closed));
    };
    if this.buf.is_empty() {
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(0));
    }
    if !chan.ring.is_empty() {
      let count = this.buf.len().min(chan.ring.len());
      for slot in &mut this.buf[..count] {
        *slot = chan.ring.pop_front();
      }
      for _ in 0..count {
        chan.send_waiters.wake_first();
      }
      drop(guard);
      shared.record(ErrorKind::None);
      return Poll::Ready(Ok(count));
    }
    let waiter = Waiter::new(cx.waker().clone());
    chan.recv_waiters.enqueue(Arc::clone(&waiter));
    drop(guard);
    shared.record(ErrorKind::WouldBlock);
    this.waiter = Some(waiter);
    Poll::Pending
  }
}

impl Drop for RecvManyFuture<'_> {
  fn drop(&mut self) {
    let Some(waiter) = self.waiter.take() else {
      return;
    };
    let mut guard = self.bus.shared.internal.lock();
    let Some(chan) = guard.channel_mut(self.id) else {
      return;
    };
    if waiter.is_released() {
      chan.recv_waiters.wake_first();
    } else {
      chan.recv_waiters.unlink(&waiter);
    }
  }
}

// --- BroadcastFuture ---

/// Future returned by [`Bus::broadcast`]. Completes once the message has
/// been delivered to every open channel in one atomic pass.
///
/// While any open channel is full, the task parks on that channel's
/// send-waiter queue; after each wakeup the whole set of open channels is
/// re-evaluated, so channels opened or closed in the meantime are respected.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct BroadcastFuture<'a> {
  bus: &'a Bus,
  value: Message,
  waiter: Option<(ChannelId, Arc<Waiter>)>,
}

impl<'a> BroadcastFuture<'a> {
  pub(super) fn new(bus: &'a Bus, value: Message) -> Self {
    BroadcastFuture {
      bus,
      value,
      waiter: None,
    }
  }
}

impl Future for BroadcastFuture<'_> {
  type Output = Result<(), BroadcastError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if let Some((id, waiter)) = this.waiter.take() {
      if waiter.register(cx.waker()) {
        this.waiter = Some((id, waiter));
        return Poll::Pending;
      }
    }

    let shared = &this.bus.shared;
    let mut guard = shared.internal.lock();
    let mut open_seen = false;
    let mut first_full = None;
    for (idx, slot) in guard.slots.iter().enumerate() {
      let Some(chan) = slot else { continue };
      open_seen = true;
      if chan.ring.is_full() {
        first_full = Some(idx);
        break;
      }
    }
    if !open_seen {
      drop(guard);
      shared.record(ErrorKind::NoChannel);
      return Poll::Ready(Err(BroadcastError::NoChannels));
    }
    if let Some(idx) = first_full {
      let id = ChannelId(idx);
      let waiter = Waiter::new(cx.waker().clone());
      if let Some(chan) = guard.channel_mut(id) {
        chan.send_waiters.enqueue(Arc::clone(&waiter));
      }
      drop(guard);
      shared.record(ErrorKind::WouldBlock);
      this.waiter = Some((id, waiter));
      return Poll::Pending;
    }
    for chan in guard.slots.iter_mut().filter_map(Option::as_mut) {
      chan.ring.push_back(this.value);
      chan.recv_waiters.wake_first();
    }
    drop(guard);
    shared.record(ErrorKind::None);
    Poll::Ready(Ok(()))
  }
}

impl Drop for BroadcastFuture<'_> {
  fn drop(&mut self) {
    let Some((id, waiter)) = self.waiter.take() else {
      return;
    };
    let mut guard = self.bus.shared.internal.lock();
    let Some(chan) = guard.channel_mut(id) else {
      return;
    };
    if waiter.is_released() {
      chan.send_waiters.wake_first();
    } else {
      chan.send_waiters.unlink(&waiter);
    }
  }
}

// --- CloseFuture ---

/// Future returned by [`Bus::close`].
///
/// The first poll tombstones the slot and wakes every waiter on both queues
/// in FIFO order (send waiters first), then yields for one scheduler turn so
/// the woken tasks can observe the tombstone and fail with their closed
/// error before the channel record is released. Closing an unknown or
/// already-closed handle completes immediately without yielding.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct CloseFuture<'a> {
  bus: &'a Bus,
  id: ChannelId,
  channel: Option<super::core::Channel>,
  yielded: bool,
}

impl<'a> CloseFuture<'a> {
  pub(super) fn new(bus: &'a Bus, id: ChannelId) -> Self {
    CloseFuture {
      bus,
      id,
      channel: None,
      yielded: false,
    }
  }
}

impl Future for CloseFuture<'_> {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    if !this.yielded {
      let taken = this.bus.shared.internal.lock().take_channel(this.id);
      let Some(mut chan) = taken else {
        return Poll::Ready(());
      };
      log::trace!("closing channel {}, waking all waiters", this.id);
      let mut waiters = chan.send_waiters.take_all();
      waiters.extend(chan.recv_waiters.take_all());
      // The records are already unlinked, so the wakes happen lock-free.
      for waiter in waiters {
        waiter.release();
      }
      this.channel = Some(chan);
      this.yielded = true;
      cx.waker().wake_by_ref();
      return Poll::Pending;
    }
    if let Some(chan) = this.channel.take() {
      // Every woken task has had a scheduler turn to observe the tombstone.
      debug_assert!(chan.send_waiters.is_empty() && chan.recv_waiters.is_empty());
      drop(chan);
    }
    Poll::Ready(())
  }
}
