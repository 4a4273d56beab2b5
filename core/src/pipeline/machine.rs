// cd_engine/src/pipeline/machine.rs

//! Explicit state-transition table driving step sequencing.
//!
//! States are `init`, one state per `stepCount`, and the terminal `final`. A step state
//! moves forward on both `Done` and `Error`; only the verdict differs, never the sequence.

use crate::core::step::Step;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MachineState {
  Init,
  Step(String),
  Final,
}

impl fmt::Display for MachineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MachineState::Init => f.write_str("init"),
      MachineState::Step(count) => f.write_str(count),
      MachineState::Final => f.write_str("final"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
  /// Leaves `init`.
  Start,
  /// A step state finished normally.
  Done,
  /// A step state raised an error.
  Error,
}

#[derive(Debug, Clone)]
pub struct TransitionTable {
  forward: HashMap<MachineState, MachineState>,
}

impl TransitionTable {
  pub fn new(steps: &[Step]) -> Self {
    let mut forward = HashMap::with_capacity(steps.len() + 1);
    let mut previous = MachineState::Init;
    for step in steps {
      let state = MachineState::Step(step.step_count.clone());
      forward.insert(previous, state.clone());
      previous = state;
    }
    forward.insert(previous, MachineState::Final);
    Self { forward }
  }

  /// The state reached from `state` on `event`, or `None` if the event is not valid there.
  pub fn next(&self, state: &MachineState, event: MachineEvent) -> Option<MachineState> {
    match (state, event) {
      (MachineState::Init, MachineEvent::Start) => self.forward.get(state).cloned(),
      (MachineState::Step(_), MachineEvent::Done | MachineEvent::Error) => self.forward.get(state).cloned(),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::step::{parse_steps, StepSpec};

  fn table(n: usize) -> TransitionTable {
    let specs = (0..n).map(|i| StepSpec::run(format!("echo {}", i))).collect();
    TransitionTable::new(&parse_steps(specs).unwrap())
  }

  #[test]
  fn walks_steps_in_order_then_final() {
    let table = table(2);
    let first = table.next(&MachineState::Init, MachineEvent::Start).unwrap();
    assert_eq!(first, MachineState::Step("1".into()));
    let second = table.next(&first, MachineEvent::Done).unwrap();
    assert_eq!(second, MachineState::Step("2".into()));
    assert_eq!(table.next(&second, MachineEvent::Error), Some(MachineState::Final));
  }

  #[test]
  fn error_and_done_share_the_forward_edge() {
    let table = table(3);
    let step = MachineState::Step("2".into());
    assert_eq!(table.next(&step, MachineEvent::Done), table.next(&step, MachineEvent::Error));
  }

  #[test]
  fn final_is_terminal_and_init_only_starts() {
    let table = table(1);
    assert_eq!(table.next(&MachineState::Final, MachineEvent::Done), None);
    assert_eq!(table.next(&MachineState::Init, MachineEvent::Done), None);
    assert_eq!(table.next(&MachineState::Step("1".into()), MachineEvent::Start), None);
  }

  #[test]
  fn empty_run_starts_straight_into_final() {
    assert_eq!(table(0).next(&MachineState::Init, MachineEvent::Start), Some(MachineState::Final));
  }
}
