//! Execution controller: sequential iteration with pause points.
//!
//! Phase machine: `Running -> AwaitingConfirmation -> {Running | Stopped}`,
//! `Running -> Completed` when the batch is exhausted. `Stopped` is terminal
//! for a controller instance. The state store already reflects every item
//! completed before a stop, so stopping requires no extra persistence.

use crate::progress::{ConfirmDecision, ConfirmationPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Running,
    AwaitingConfirmation,
    Stopped,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ExecutionController {
    /// Pause after every `interval` items; `None` never pauses
    interval: Option<usize>,
    total: usize,
    counters: RunCounters,
    phase: ControllerPhase,
}

impl ExecutionController {
    pub fn new(interval: Option<usize>, total: usize) -> Self {
        Self {
            // An interval of zero would pause before every item forever
            interval: interval.filter(|n| *n > 0),
            total,
            counters: RunCounters::default(),
            phase: ControllerPhase::Running,
        }
    }

    /// Record one completed item. Called exactly once per item, pause or not.
    pub fn record_result(&mut self, success: bool) {
        self.counters.processed += 1;
        if success {
            self.counters.succeeded += 1;
        } else {
            self.counters.failed += 1;
        }
    }

    /// A pause is due after the Nth, 2Nth, ... item, unless that item was
    /// also the last in the batch.
    fn pause_due(&self) -> bool {
        match self.interval {
            Some(interval) => {
                self.counters.processed > 0
                    && self.counters.processed % interval == 0
                    && self.counters.processed < self.total
            }
            None => false,
        }
    }

    /// Evaluate the pause policy after an item. Returns `true` to keep
    /// going, `false` once the operator has stopped the run.
    pub fn checkpoint(&mut self, prompt: &mut dyn ConfirmationPrompt) -> bool {
        if self.phase != ControllerPhase::Running {
            return false;
        }
        if !self.pause_due() {
            return true;
        }

        self.phase = ControllerPhase::AwaitingConfirmation;
        match prompt.confirm_continue(self.counters.processed, self.total) {
            ConfirmDecision::Continue => {
                self.phase = ControllerPhase::Running;
                true
            }
            ConfirmDecision::Stop => {
                self.phase = ControllerPhase::Stopped;
                false
            }
        }
    }

    /// Mark the batch exhausted. No-op if the operator already stopped it.
    pub fn finish(&mut self) {
        if self.phase == ControllerPhase::Running {
            self.phase = ControllerPhase::Completed;
        }
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn stopped(&self) -> bool {
        self.phase == ControllerPhase::Stopped
    }
}
