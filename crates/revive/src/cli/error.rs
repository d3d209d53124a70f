//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    // === Common error constructors ===

    /// No state file to resume from
    pub fn no_resumable_state(dir: &Path, project: &str) -> Self {
        Self::new(format!("No resumable state found for project '{project}'"))
            .with_context(format!("Looked for state files in: {}", dir.display()))
            .with_suggestion("TRY: Start a fresh run with --file <accounts.json>")
            .with_suggestion(format!("TRY: ls {}", dir.display()))
    }

    /// Accounts input file does not exist
    pub fn accounts_file_not_found(path: &Path) -> Self {
        Self::new(format!("Accounts file not found: {}", path.display()))
            .with_context("The rescue command expects a JSON array of account codes")
            .with_suggestion(format!("TRY: ls -la {}", path.display()))
            .with_suggestion(r#"TRY: echo '["acct_1", "acct_2"]' > accounts.json"#)
    }

    /// Required environment variable is missing
    pub fn missing_env(name: &str, purpose: &str) -> Self {
        Self::new(format!("Environment variable {name} is not set"))
            .with_context(format!("{name} provides {purpose}"))
            .with_suggestion(format!("TRY: export {name}=..."))
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            writeln!(f, "\n{context}")?;
        }
        for suggestion in &self.suggestions {
            writeln!(f, "  {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
