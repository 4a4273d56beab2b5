// cd_engine/src/core/context_data.rs
use crate::core::context::{Context, StepEntry};
use crate::core::step::Step;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared handle to the run [`Context`], passed to hooks and the step executor.
///
/// IMPORTANT: Lock guards obtained from this struct are blocking and MUST NOT
/// be held across `.await` suspension points.
#[derive(Debug, Clone)]
pub struct ContextData(Arc<RwLock<Context>>);

impl ContextData {
  pub fn new(context: Context) -> Self {
    ContextData(Arc::new(RwLock::new(context)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, Context> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, Context> {
    self.0.write()
  }

  /// A clone of the context as it is right now.
  pub fn snapshot(&self) -> Context {
    self.0.read().clone()
  }

  /// Clone of one step entry, for handing to hooks without holding the lock.
  pub fn step_entry_cloned(&self, step_count: &str) -> Option<StepEntry> {
    self.read().step(step_count).cloned()
  }

  /// Mutates the entry for `step_count` in place. Returns false when no such entry exists.
  pub fn update_step<F>(&self, step_count: &str, f: F) -> bool
  where
    F: FnOnce(&mut StepEntry),
  {
    let mut guard = self.write();
    match guard.step_mut(step_count) {
      Some(entry) => {
        f(entry);
        true
      }
      None => false,
    }
  }

  /// Pre-seeds one `pending` entry per step, after any entries already present.
  pub fn seed_steps(&self, steps: &[Step]) {
    let mut guard = self.write();
    for step in steps {
      if guard.step(&step.step_count).is_none() {
        guard.steps.push(StepEntry::pending(step));
      }
    }
  }

  /// Places the init entry at the front. Only the first call has any effect.
  pub fn prepend_init(&self, entry: StepEntry) {
    let mut guard = self.write();
    if guard.step(&entry.step_count).is_none() {
      guard.steps.insert(0, entry);
    }
  }
}
