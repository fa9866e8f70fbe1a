#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Cooperatively-scheduled message bus for lightweight tasks.
//!
//! Weft multiplexes many cooperative tasks over a set of indexed, bounded
//! FIFO channels owned by a single [`Bus`]. Blocking operations are plain
//! futures: a full `send` or empty `recv` registers the task in a per-channel
//! waiter queue and returns `Poll::Pending`; the counterpart operation wakes
//! the first waiter when it frees a slot or publishes a message. On top of
//! the single-message operations the bus offers batch transfer
//! ([`Bus::send_many`], [`Bus::recv_many`]) and an all-or-nothing
//! [`Bus::broadcast`] that delivers one message to every open channel.
//!
//! The bus implements no scheduling of its own. Any executor that polls
//! futures drives it; the concurrency contract (atomic composite operations,
//! strict FIFO wakeup fairness) is stated for single-threaded cooperative
//! executors, where task switches happen only at `.await` points.
//!
//! ```rust
//! let bus = weft::Bus::new();
//! let ch = bus.open(4);
//!
//! bus.try_send(ch, 7).unwrap();
//! assert_eq!(bus.try_recv(ch), Ok(7));
//! ```

pub mod bus;
pub mod error;

mod internal;

pub use bus::{
  BroadcastFuture, Bus, ChannelId, CloseFuture, RecvFuture, RecvManyFuture, SendFuture,
  SendManyFuture,
};
pub use error::{
  BroadcastError, ErrorKind, RecvError, SendError, TryBroadcastError, TryRecvError, TrySendError,
};

/// Message payload carried by every channel.
pub type Message = u32;
