//! The background maintenance thread.
//!
//! The janitor periodically runs the maintenance drain so buffered events
//! are applied and expired entries collected even on an idle cache. It
//! parks on a condvar between ticks so buffer pressure can wake it early
//! instead of waiting out the interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Signal {
  stop: AtomicBool,
  pending: Mutex<bool>,
  wake: Condvar,
}

pub(crate) struct Janitor {
  signal: Arc<Signal>,
  handle: Option<JoinHandle<()>>,
}

impl Janitor {
  /// Spawns the janitor thread. `task` runs once per tick (or wake-up) and
  /// returns `false` when the cache is gone and the thread should exit.
  pub(crate) fn spawn<F>(tick_interval: Duration, task: F) -> Self
  where
    F: Fn() -> bool + Send + 'static,
  {
    let signal = Arc::new(Signal {
      stop: AtomicBool::new(false),
      pending: Mutex::new(false),
      wake: Condvar::new(),
    });

    let thread_signal = Arc::clone(&signal);
    let handle = thread::spawn(move || {
      log::trace!("cache janitor started, tick interval {tick_interval:?}");
      loop {
        {
          let mut pending = thread_signal.pending.lock();
          if !*pending {
            let _ = thread_signal.wake.wait_for(&mut pending, tick_interval);
          }
          *pending = false;
        }
        if thread_signal.stop.load(Ordering::Acquire) {
          break;
        }
        if !task() {
          break;
        }
      }
      log::trace!("cache janitor stopped");
    });

    Self {
      signal,
      handle: Some(handle),
    }
  }

  /// Requests an early maintenance pass.
  pub(crate) fn wake(&self) {
    *self.signal.pending.lock() = true;
    self.signal.wake.notify_one();
  }

  /// Signals the thread to stop and waits for it to exit.
  pub(crate) fn stop(mut self) {
    self.signal.stop.store(true, Ordering::Release);
    self.wake();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

impl Drop for Janitor {
  fn drop(&mut self) {
    // `stop` consumed self on the orderly path; anything else still needs
    // the thread told to exit, but joining here could block a panicking
    // caller, so it is left to finish on its own.
    self.signal.stop.store(true, Ordering::Release);
    *self.signal.pending.lock() = true;
    self.signal.wake.notify_one();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn wake_triggers_an_early_pass() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let janitor = Janitor::spawn(Duration::from_secs(60), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      true
    });

    janitor.wake();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while ticks.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
      thread::sleep(Duration::from_millis(5));
    }
    assert!(ticks.load(Ordering::SeqCst) >= 1);
    janitor.stop();
  }

  #[test]
  fn stop_joins_the_thread() {
    let janitor = Janitor::spawn(Duration::from_millis(1), || true);
    thread::sleep(Duration::from_millis(10));
    janitor.stop();
  }

  #[test]
  fn task_returning_false_ends_the_loop() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let janitor = Janitor::spawn(Duration::from_millis(1), move || {
      counter.fetch_add(1, Ordering::SeqCst) < 2
    });
    thread::sleep(Duration::from_millis(50));
    let seen = ticks.load(Ordering::SeqCst);
    assert!(seen <= 3, "janitor kept ticking after the task asked to stop");
    janitor.stop();
  }
}
