// src/error.rs

use core::fmt;

/// Classification shared by every fallible bus operation.
///
/// The bus records the kind of the most recent fallible call (see
/// [`Bus::last_error`](crate::Bus::last_error)); discriminant values are
/// stable across versions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum ErrorKind {
  /// The most recent fallible operation succeeded.
  #[default]
  None = 0,
  /// The handle did not name an open channel.
  NoChannel = 1,
  /// The operation could not make progress without suspending.
  WouldBlock = 2,
}

impl ErrorKind {
  pub(crate) fn from_u8(raw: u8) -> Self {
    match raw {
      1 => ErrorKind::NoChannel,
      2 => ErrorKind::WouldBlock,
      _ => ErrorKind::None,
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::None => write!(f, "no error"),
      ErrorKind::NoChannel => write!(f, "no such channel"),
      ErrorKind::WouldBlock => write!(f, "operation would block"),
    }
  }
}

/// Error returned by `try_send` operations when the message could not be
/// accepted immediately.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TrySendError {
  /// The channel buffer is at capacity.
  Full,
  /// The handle does not name an open channel.
  Closed,
}

impl TrySendError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    match self {
      TrySendError::Full => ErrorKind::WouldBlock,
      TrySendError::Closed => ErrorKind::NoChannel,
    }
  }
}

impl std::error::Error for TrySendError {}
impl fmt::Display for TrySendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendError::Full => write!(f, "channel full"),
      TrySendError::Closed => write!(f, "channel closed"),
    }
  }
}

/// Error returned by `try_recv` operations when no message was available.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// The channel buffer holds no messages.
  Empty,
  /// The handle does not name an open channel.
  Closed,
}

impl TryRecvError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    match self {
      TryRecvError::Empty => ErrorKind::WouldBlock,
      TryRecvError::Closed => ErrorKind::NoChannel,
    }
  }
}

impl std::error::Error for TryRecvError {}
impl fmt::Display for TryRecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvError::Empty => write!(f, "channel empty"),
      TryRecvError::Closed => write!(f, "channel closed"),
    }
  }
}

/// Error returned by blocking `send` variants.
///
/// A blocking send absorbs the full-buffer condition by suspending, so the
/// only way it can fail is the channel going away.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SendError {
  /// The channel was closed before the message could be accepted.
  Closed,
}

impl SendError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::NoChannel
  }
}

impl std::error::Error for SendError {}
impl fmt::Display for SendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendError::Closed => write!(f, "channel closed"),
    }
  }
}

/// Error returned by blocking `recv` variants.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvError {
  /// The channel was closed before a message arrived.
  Closed,
}

impl RecvError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::NoChannel
  }
}

impl std::error::Error for RecvError {}
impl fmt::Display for RecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvError::Closed => write!(f, "channel closed"),
    }
  }
}

/// Error returned by [`Bus::try_broadcast`](crate::Bus::try_broadcast).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryBroadcastError {
  /// The bus has no open channels to deliver to.
  NoChannels,
  /// At least one open channel is at capacity; nothing was delivered.
  Full,
}

impl TryBroadcastError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    match self {
      TryBroadcastError::NoChannels => ErrorKind::NoChannel,
      TryBroadcastError::Full => ErrorKind::WouldBlock,
    }
  }
}

impl std::error::Error for TryBroadcastError {}
impl fmt::Display for TryBroadcastError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryBroadcastError::NoChannels => write!(f, "no open channels"),
      TryBroadcastError::Full => write!(f, "a channel is full"),
    }
  }
}

/// Error returned by the blocking [`Bus::broadcast`](crate::Bus::broadcast).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BroadcastError {
  /// The bus has no open channels to deliver to.
  NoChannels,
}

impl BroadcastError {
  /// The stable classification of this error.
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::NoChannel
  }
}

impl std::error::Error for BroadcastError {}
impl fmt::Display for BroadcastError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BroadcastError::NoChannels => write!(f, "no open channels"),
    }
  }
}
