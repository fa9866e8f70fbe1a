//! Batch transfer behaviour: partial progress, exact wake counts, and the
//! blocking variants.

mod common;
use common::TestRt;

use std::cell::RefCell;
use std::rc::Rc;

use weft::{Bus, ErrorKind, TryRecvError, TrySendError};

#[test]
fn partial_batch_fills_the_remaining_space() {
  let bus = Bus::new();
  let ch = bus.open(3);
  bus.try_send(ch, 1).unwrap();

  assert_eq!(bus.try_send_many(ch, &[10, 20, 30, 40]), Ok(2));
  assert_eq!(bus.len(ch), Some(3));
  assert_eq!(bus.try_recv(ch), Ok(1));
  assert_eq!(bus.try_recv(ch), Ok(10));
  assert_eq!(bus.try_recv(ch), Ok(20));
}

#[test]
fn full_channel_rejects_the_whole_batch() {
  let bus = Bus::new();
  let ch = bus.open(2);
  bus.try_send_many(ch, &[1, 2]).unwrap();

  assert_eq!(bus.try_send_many(ch, &[3, 4]), Err(TrySendError::Full));
  assert_eq!(bus.last_error(), ErrorKind::WouldBlock);
  assert_eq!(bus.len(ch), Some(2));
  assert_eq!(bus.try_recv(ch), Ok(1));
}

#[test]
fn recv_many_fills_a_prefix_of_the_buffer() {
  let bus = Bus::new();
  let ch = bus.open(4);
  bus.try_send_many(ch, &[5, 6, 7]).unwrap();

  let mut buf = [0; 2];
  assert_eq!(bus.try_recv_many(ch, &mut buf), Ok(2));
  assert_eq!(buf, [5, 6]);

  let mut buf = [0; 8];
  assert_eq!(bus.try_recv_many(ch, &mut buf), Ok(1));
  assert_eq!(buf[0], 7);

  assert_eq!(bus.try_recv_many(ch, &mut buf), Err(TryRecvError::Empty));
  assert_eq!(bus.last_error(), ErrorKind::WouldBlock);
}

#[test]
fn empty_batches_are_successful_noops() {
  let bus = Bus::new();
  let ch = bus.open(1);
  bus.try_send(ch, 1).unwrap();

  // Even against a full (or empty) ring, a zero-length transfer succeeds.
  assert_eq!(bus.try_send_many(ch, &[]), Ok(0));
  assert_eq!(bus.last_error(), ErrorKind::None);
  assert_eq!(bus.try_recv(ch), Ok(1));
  assert_eq!(bus.try_recv_many(ch, &mut []), Ok(0));
  assert_eq!(bus.last_error(), ErrorKind::None);
}

#[test]
fn batch_send_wakes_one_receiver_per_message() {
  let mut rt = TestRt::new();
  let bus = Bus::new();
  let ch = bus.open(4);

  let got = Rc::new(RefCell::new(Vec::new()));
  for _ in 0..3 {
    let bus = bus.clone();
    let got = Rc::clone(&got);
    rt.spawn(async move {
      let value = bus.recv(ch).await.unwrap();
      got.borrow_mut().push(value);
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 3);

  // Two messages wake exactly the first two receivers.
  assert_eq!(bus.try_send_many(ch, &[5, 6]), Ok(2));
  rt.run();
  assert_eq!(*got.borrow(), vec![5, 6]);
  assert_eq!(rt.pending_tasks(), 1);

  bus.try_send(ch, 7).unwrap();
  rt.run();
  assert_eq!(*got.borrow(), vec![5, 6, 7]);
  assert_eq!(rt.pending_tasks(), 0);
}

#[test]
fn batch_recv_wakes_one_sender_per_slot_freed() {
  let mut rt = TestRt::new();
  let bus = Bus::new();
  let ch = bus.open(2);
  bus.try_send_many(ch, &[1, 2]).unwrap();

  for value in [3, 4, 5] {
    let bus = bus.clone();
    rt.spawn(async move {
      bus.send(ch, value).await.unwrap();
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 3);

  // Draining two messages frees two slots and releases the first two
  // parked senders only.
  let mut buf = [0; 2];
  assert_eq!(bus.try_recv_many(ch, &mut buf), Ok(2));
  assert_eq!(buf, [1, 2]);
  rt.run();
  assert_eq!(rt.pending_tasks(), 1);
  assert_eq!(bus.len(ch), Some(2));

  let mut buf = [0; 4];
  assert_eq!(bus.try_recv_many(ch, &mut buf), Ok(2));
  assert_eq!(&buf[..2], &[3, 4]);
  rt.run();
  assert_eq!(rt.pending_tasks(), 0);
  assert_eq!(bus.try_recv(ch), Ok(5));
}

#[test]
fn blocking_batch_send_takes_partial_progress() {
  let mut rt = TestRt::new();
  let bus = Bus::new();
  let ch = bus.open(2);
  bus.try_send_many(ch, &[1, 2]).unwrap();

  let sent = Rc::new(RefCell::new(Vec::new()));
  {
    let bus = bus.clone();
    let sent = Rc::clone(&sent);
    rt.spawn(async move {
      let count = bus.send_many(ch, &[3, 4, 5]).await.unwrap();
      sent.borrow_mut().push(count);
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 1);

  // One freed slot: the batch resumes and accepts a single message. The
  // caller is told how far it got rather than being held for the rest.
  assert_eq!(bus.try_recv(ch), Ok(1));
  rt.run();
  assert_eq!(rt.pending_tasks(), 0);
  assert_eq!(*sent.borrow(), vec![1]);
  assert_eq!(bus.try_recv(ch), Ok(2));
  assert_eq!(bus.try_recv(ch), Ok(3));
}

#[test]
fn blocking_batch_recv_returns_what_is_available() {
  let mut rt = TestRt::new();
  let bus = Bus::new();
  let ch = bus.open(4);

  let got = Rc::new(RefCell::new(Vec::new()));
  {
    let bus = bus.clone();
    let got = Rc::clone(&got);
    rt.spawn(async move {
      let mut buf = [0; 3];
      let count = bus.recv_many(ch, &mut buf).await.unwrap();
      got.borrow_mut().extend_from_slice(&buf[..count]);
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 1);

  bus.try_send_many(ch, &[8, 9]).unwrap();
  rt.run();
  assert_eq!(rt.pending_tasks(), 0);
  assert_eq!(*got.borrow(), vec![8, 9]);
}

#[test]
fn blocking_batch_send_fails_on_close() {
  let mut rt = TestRt::new();
  let bus = Bus::new();
  let ch = bus.open(1);
  bus.try_send(ch, 1).unwrap();

  let results = Rc::new(RefCell::new(Vec::new()));
  {
    let bus = bus.clone();
    let results = Rc::clone(&results);
    rt.spawn(async move {
      results.borrow_mut().push(bus.send_many(ch, &[2, 3]).await);
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 1);

  {
    let bus = bus.clone();
    rt.spawn(async move {
      bus.close(ch).await;
    });
  }
  rt.run();
  assert_eq!(rt.pending_tasks(), 0);
  assert_eq!(*results.borrow(), vec![Err(weft::SendError::Closed)]);
}
