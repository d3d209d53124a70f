//! Capability traits for operator interaction.
//!
//! The engines and the controller never touch the console directly; progress
//! reporting and confirmation prompts are injected, so tests script them and
//! the core stays UI-agnostic.

use std::io::{BufRead, Write};

/// Receives per-item progress from a batch driver.
pub trait ProgressReporter {
    fn on_item(&self, current: usize, total: usize, id: &str);
}

/// Progress sink that reports nothing.
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn on_item(&self, _current: usize, _total: usize, _id: &str) {}
}

/// Logs progress through tracing.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn on_item(&self, current: usize, total: usize, id: &str) {
        tracing::info!(current, total, account = id, "processed");
    }
}

/// Operator decision at a pause point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    Continue,
    Stop,
}

/// Asks the operator whether to keep going mid-batch.
pub trait ConfirmationPrompt {
    fn confirm_continue(&mut self, processed: usize, total: usize) -> ConfirmDecision;
}

/// Interactive prompt on stdin/stderr.
///
/// Anything other than an explicit no continues; a closed stdin (end of
/// input) stops, since an unattended run has nobody to answer for it.
pub struct StdinPrompt;

impl ConfirmationPrompt for StdinPrompt {
    fn confirm_continue(&mut self, processed: usize, total: usize) -> ConfirmDecision {
        eprint!("Processed {processed}/{total}. Continue? [Y/n] ");
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) => ConfirmDecision::Stop,
            Ok(_) => parse_answer(&answer),
            Err(_) => ConfirmDecision::Stop,
        }
    }
}

fn parse_answer(answer: &str) -> ConfirmDecision {
    match answer.trim().to_lowercase().as_str() {
        "n" | "no" => ConfirmDecision::Stop,
        _ => ConfirmDecision::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_no_stops() {
        assert_eq!(parse_answer("n"), ConfirmDecision::Stop);
        assert_eq!(parse_answer("No"), ConfirmDecision::Stop);
        assert_eq!(parse_answer("y"), ConfirmDecision::Continue);
        assert_eq!(parse_answer(""), ConfirmDecision::Continue);
        assert_eq!(parse_answer("whatever"), ConfirmDecision::Continue);
    }
}
