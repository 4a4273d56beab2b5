// cd_engine/src/pipeline/execution.rs

//! Contains `Engine::start()`: the init phase, the state-machine loop over step states and
//! the final phase.

use crate::conditional::evaluator::ConditionEvaluator;
use crate::core::context::{Context, StepEntry};
use crate::core::status::StepStatus;
use crate::core::step::{parse_steps, Step};
use crate::error::{error_chain, EngineResult};
use crate::logging::{log_file_name, LoggerOverrides};
use crate::pipeline::definition::{
  Engine, COMPLETED_LOG_BANNER, COMPLETED_STEP_COUNT, INIT_LOG_BANNER, INIT_STEP_COUNT, INIT_STEP_NAME,
};
use crate::pipeline::machine::{MachineEvent, MachineState, TransitionTable};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::{event, instrument, Level};

impl Engine {
  /// Runs the init phase, every step in order and the final phase, then returns the context.
  ///
  /// Never fails: every error is folded into `Context::status`, `Context::error` and the
  /// per-step entries. A second call returns the current context without running anything.
  #[instrument(name = "Engine::start", skip_all, fields(cwd = %self.context.read().cwd.display()))]
  pub async fn start(&self) -> Context {
    if self.started.swap(true, Ordering::SeqCst) {
      event!(Level::WARN, "Engine already started; returning current context.");
      return self.context.snapshot();
    }
    event!(Level::DEBUG, "Engine run starting.");

    let steps = self.do_init().await;
    if steps.is_empty() {
      let init_status = self.init_entry().map(|e| e.status).unwrap_or(StepStatus::Success);
      if let Some(entry) = self.init_entry() {
        self.context.prepend_init(entry);
      }
      self.context.write().status = init_status;
      self.do_completed().await;
      return self.context.snapshot();
    }

    self.context.seed_steps(&steps);
    if let Some(entry) = self.init_entry() {
      self.context.prepend_init(entry);
    }

    let table = TransitionTable::new(&steps);
    let by_count: HashMap<&str, &Step> = steps.iter().map(|s| (s.step_count.as_str(), s)).collect();
    let mut state = MachineState::Init;
    let mut event_in = MachineEvent::Start;

    loop {
      let next = match table.next(&state, event_in) {
        Some(next) => next,
        None => {
          event!(Level::ERROR, state = %state, "No transition from state; finishing run.");
          MachineState::Final
        }
      };
      event!(Level::DEBUG, from = %state, to = %next, "step transition");
      state = next;

      match &state {
        MachineState::Step(count) => {
          let Some(step) = by_count.get(count.as_str()) else {
            event!(Level::ERROR, step_count = %count, "Transition to unknown step.");
            state = MachineState::Final;
            continue;
          };
          event_in = match self.run_step_state(step).await {
            Ok(()) => MachineEvent::Done,
            Err(e) => {
              event!(Level::DEBUG, step_count = %count, error = %self.redact(&e.to_string()), "Step state raised an error.");
              MachineEvent::Error
            }
          };
        }
        MachineState::Final => {
          self.do_final().await;
          break;
        }
        MachineState::Init => {
          event!(Level::ERROR, "State machine returned to init; finishing run.");
          self.do_final().await;
          break;
        }
      }
    }

    event!(Level::DEBUG, status = %self.context.read().status, "Engine run finished.");
    self.context.snapshot()
  }

  /// Runs `on_init` and decides the step list. Errors fail the run and fall back to the
  /// configured steps.
  async fn do_init(&self) -> Vec<Step> {
    self.context.write().status = StepStatus::Running;
    let file_name = log_file_name(INIT_STEP_COUNT);
    let logger = self.loggers.logger(&file_name, &LoggerOverrides::default());
    logger.info(INIT_LOG_BANNER);
    self.record.with(|r| r.mark_started());

    let outcome = match self.invoke_init_hook(&logger).await {
      Ok(output) => {
        let specs = output.steps.clone().unwrap_or_else(|| self.config.steps.clone());
        parse_steps(specs).map(|steps| (output, steps))
      }
      Err(e) => Err(e),
    };

    match outcome {
      Ok((output, steps)) => {
        let entry = StepEntry {
          step_count: INIT_STEP_COUNT.to_string(),
          name: output.name.unwrap_or_else(|| INIT_STEP_NAME.to_string()),
          status: StepStatus::Success,
          outputs: Value::Object(output.outputs),
          error: None,
          process_time: self.record.with(|r| r.elapsed_secs()),
          definition: None,
        };
        self.record.with(|r| r.set_init_data(entry));
        logger.close();
        self.upload_log(&file_name).await;
        steps
      }
      Err(err) => {
        event!(Level::ERROR, error = %self.redact(&err.to_string()), "Init phase failed.");
        self.output_error_log(&logger, &err);
        let message = error_chain(&err);
        let entry = StepEntry {
          step_count: INIT_STEP_COUNT.to_string(),
          name: INIT_STEP_NAME.to_string(),
          status: StepStatus::Failure,
          outputs: Value::Object(Default::default()),
          error: Some(message.clone()),
          process_time: self.record.with(|r| r.elapsed_secs()),
          definition: None,
        };
        self.record.with(|r| {
          r.record_failure(false);
          r.set_init_data(entry);
        });
        {
          let mut ctx = self.context.write();
          ctx.status = StepStatus::Failure;
          ctx.error = Some(message);
        }

        let steps = match parse_steps(self.config.steps.clone()) {
          Ok(steps) => steps,
          Err(e) => {
            event!(Level::ERROR, error = %self.redact(&e.to_string()), "Configured steps are invalid; running none.");
            logger.error(&e.to_string());
            Vec::new()
          }
        };
        logger.close();
        self.upload_log(&file_name).await;
        steps
      }
    }
  }

  /// One step state: mark it running, gate it, then execute, skip or cancel it.
  #[instrument(name = "step", skip_all, fields(step_count = %step.step_count))]
  async fn run_step_state(&self, step: &Step) -> EngineResult<()> {
    self.record.with(|r| r.mark_started());
    let logger = self.loggers.logger(&log_file_name(&step.step_count), &LoggerOverrides::default());
    self.mark_running(step);

    if let Some(condition) = &step.if_condition {
      let variables = self.variables();
      let status = self.record.status();
      let evaluator = ConditionEvaluator::new(self.compiler.as_ref());
      if evaluator.evaluate(condition, status, &variables) {
        return self.handle_src(step, &logger, true).await;
      }
      event!(Level::DEBUG, condition = %condition, "Condition not met; skipping step.");
      return self.do_skip(step, &logger).await;
    }

    match self.record.status() {
      StepStatus::Cancel => self.do_cancel(step, &logger).await,
      StepStatus::Failure => self.do_skip(step, &logger).await,
      _ => self.handle_src(step, &logger, false).await,
    }
  }

  fn mark_running(&self, step: &Step) {
    self.context.update_step(&step.step_count, |entry| entry.status = StepStatus::Running);
    let mut ctx = self.context.write();
    ctx.step_count = Some(step.step_count.clone());
    ctx.env = step.run_env();
  }

  /// Final state: report the verdict, with `error-with-continue` collapsed to `success`.
  /// Every other status passes through, so a run whose steps were all skipped stays `pending`.
  async fn do_final(&self) {
    let status = self.record.reported_status();
    self.context.write().status = status;
    self.do_completed().await;
  }

  async fn do_completed(&self) {
    self.context.write().completed = true;
    let file_name = log_file_name(COMPLETED_STEP_COUNT);
    let logger = self.loggers.logger(&file_name, &LoggerOverrides::default());
    logger.info(COMPLETED_LOG_BANNER);
    self.invoke_completed_hook(&logger).await;
    logger.close();
    self.upload_log(&file_name).await;
  }
}
