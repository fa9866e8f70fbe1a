#![allow(dead_code)]

//! A deterministic single-threaded cooperative executor for bus tests.
//!
//! Tasks are polled from a FIFO ready queue; wakeups push the task id back
//! onto the queue and coalesce while the task is already scheduled. Because
//! everything runs on the caller's thread and in queue order, tests can
//! script exact interleavings: spawn some tasks, `run` until every runnable
//! task has parked or finished, poke the bus, `run` again.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

type ReadyQueue = Arc<Mutex<VecDeque<usize>>>;

struct TaskWaker {
  id: usize,
  ready: ReadyQueue,
  scheduled: Arc<AtomicBool>,
}

impl Wake for TaskWaker {
  fn wake(self: Arc<Self>) {
    self.wake_by_ref();
  }

  fn wake_by_ref(self: &Arc<Self>) {
    // Coalesce: a task already in the ready queue is not queued twice.
    if !self.scheduled.swap(true, Ordering::AcqRel) {
      self.ready.lock().unwrap().push_back(self.id);
    }
  }
}

struct Task {
  future: Pin<Box<dyn Future<Output = ()>>>,
  scheduled: Arc<AtomicBool>,
  waker: Waker,
}

/// The executor. Single-threaded, FIFO, no timers, no IO.
pub struct TestRt {
  tasks: Vec<Option<Task>>,
  ready: ReadyQueue,
}

impl TestRt {
  pub fn new() -> Self {
    TestRt {
      tasks: Vec::new(),
      ready: Arc::new(Mutex::new(VecDeque::new())),
    }
  }

  /// Spawns a task. It first runs during the next `run` call, after every
  /// task spawned before it.
  pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) {
    let id = self.tasks.len();
    let scheduled = Arc::new(AtomicBool::new(true));
    let waker = Waker::from(Arc::new(TaskWaker {
      id,
      ready: Arc::clone(&self.ready),
      scheduled: Arc::clone(&scheduled),
    }));
    self.tasks.push(Some(Task {
      future: Box::pin(future),
      scheduled,
      waker,
    }));
    self.ready.lock().unwrap().push_back(id);
  }

  /// Polls ready tasks in queue order until every runnable task has either
  /// completed or suspended.
  pub fn run(&mut self) {
    loop {
      let next = self.ready.lock().unwrap().pop_front();
      let Some(id) = next else { return };
      let Some(task) = self.tasks[id].as_mut() else {
        continue;
      };
      task.scheduled.store(false, Ordering::Release);
      let waker = task.waker.clone();
      let mut cx = Context::from_waker(&waker);
      if task.future.as_mut().poll(&mut cx).is_ready() {
        self.tasks[id] = None;
      }
    }
  }

  /// Number of spawned tasks that have not completed yet.
  pub fn pending_tasks(&self) -> usize {
    self.tasks.iter().filter(|task| task.is_some()).count()
  }
}

impl Default for TestRt {
  fn default() -> Self {
    Self::new()
  }
}

/// Re-queues the current task at the tail of the ready queue for one turn.
pub async fn yield_now() {
  struct YieldNow {
    yielded: bool,
  }

  impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
      if self.yielded {
        Poll::Ready(())
      } else {
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
      }
    }
  }

  YieldNow { yielded: false }.await
}
