// cd_engine/src/process/registry.rs

//! Tracks live child processes so a cancellation can signal all of them at once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{event, Level};

#[derive(Debug, Default)]
struct RegistryInner {
  next_id: AtomicU64,
  live: Mutex<HashMap<u64, oneshot::Sender<()>>>,
}

/// Cloneable handle. Every clone sees the same set of live processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
  inner: Arc<RegistryInner>,
}

/// Removes its process from the registry when dropped.
#[derive(Debug)]
pub struct ProcessGuard {
  id: u64,
  inner: Arc<RegistryInner>,
}

impl Drop for ProcessGuard {
  fn drop(&mut self) {
    self.inner.live.lock().remove(&self.id);
  }
}

impl ProcessRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a process. The receiver fires when `kill_all` is called while the guard lives.
  pub fn register(&self) -> (ProcessGuard, oneshot::Receiver<()>) {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    self.inner.live.lock().insert(id, tx);
    (
      ProcessGuard {
        id,
        inner: Arc::clone(&self.inner),
      },
      rx,
    )
  }

  pub fn live_count(&self) -> usize {
    self.inner.live.lock().len()
  }

  /// Signals every tracked process. Does not wait for any of them to exit.
  pub fn kill_all(&self) -> usize {
    let senders: Vec<_> = self.inner.live.lock().drain().map(|(_, tx)| tx).collect();
    let count = senders.len();
    for tx in senders {
      let _ = tx.send(());
    }
    if count > 0 {
      event!(Level::INFO, count, "Sent termination signal to live child processes.");
    }
    count
  }
}
