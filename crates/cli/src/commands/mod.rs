//! Command handlers for the Hivemind CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod assess;
pub mod assignment;
pub mod corpus;
pub mod expert;
pub mod request;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use assess::AssessCommand;
pub use assignment::AssignmentCommand;
pub use corpus::CorpusCommand;
pub use expert::ExpertCommand;
pub use request::RequestCommand;

use hivemind_core::{AppError, AppResult};
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Split a comma-separated tag list, dropping blanks.
pub(crate) fn split_tags(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|t| t.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        let raw = vec!["Finance, Marketing".to_string(), " ".to_string(), "Physics".to_string()];
        assert_eq!(split_tags(&raw), vec!["Finance", "Marketing", "Physics"]);
    }
}
