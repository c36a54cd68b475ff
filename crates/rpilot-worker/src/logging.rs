//! Structured project logging utilities.
//!
//! Provides consistent, structured logging for pipeline invocations with
//! tracing spans and contextual information.

use tracing::{error, info, warn};

use rpilot_models::ProjectId;

/// Project logger for structured logging with consistent formatting.
///
/// Tags every line with the project ID and the stage being processed.
#[derive(Debug, Clone)]
pub struct ProjectLogger {
    project_id: String,
    stage: String,
}

impl ProjectLogger {
    /// Create a new logger for a project at a specific stage.
    pub fn new(project_id: &ProjectId, stage: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// Log a progress update during stage processing.
    pub fn log_progress(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            stage = %self.stage,
            "Stage progress: {}", message
        );
    }

    /// Log a warning during stage processing.
    pub fn log_warning(&self, message: &str) {
        warn!(
            project_id = %self.project_id,
            stage = %self.stage,
            "Stage warning: {}", message
        );
    }

    /// Log an error during stage processing.
    pub fn log_error(&self, message: &str) {
        error!(
            project_id = %self.project_id,
            stage = %self.stage,
            "Stage error: {}", message
        );
    }

    /// Log the completion of a stage.
    pub fn log_completion(&self, message: &str) {
        info!(
            project_id = %self.project_id,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    /// Get the project ID.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_logger_creation() {
        let project_id = ProjectId::from_string("p-123");
        let logger = ProjectLogger::new(&project_id, "audio");

        assert_eq!(logger.project_id(), "p-123");
    }
}
