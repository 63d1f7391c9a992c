//! Per-item results of engine operations.
//!
//! Multi-step operations never collapse into a single success flag: each
//! container or image touched gets its own [`StepOutcome`].

use std::fmt;

use berth_common::error::Result;
use serde::Serialize;

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Started a container.
    StartContainer,
    /// Stopped a container.
    StopContainer,
    /// Removed a container.
    RemoveContainer,
    /// Removed an image.
    RemoveImage,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartContainer => write!(f, "start"),
            Self::StopContainer => write!(f, "stop"),
            Self::RemoveContainer => write!(f, "remove container"),
            Self::RemoveImage => write!(f, "remove image"),
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The engine accepted the request.
    Succeeded,
    /// The engine rejected the request.
    Failed {
        /// Error reported for the step.
        reason: String,
    },
    /// The step was not attempted.
    Skipped {
        /// Why the step was not attempted.
        reason: String,
    },
}

/// Result of one step against one container or image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Operation attempted.
    pub action: StepAction,
    /// Full id of the container or image.
    pub target: String,
    /// Short id or name shown to the user.
    pub label: String,
    /// How the step ended.
    pub status: StepStatus,
}

impl StepOutcome {
    /// Records the result of an attempted step.
    #[must_use]
    pub fn from_result(
        action: StepAction,
        target: impl Into<String>,
        label: impl Into<String>,
        result: Result<()>,
    ) -> Self {
        let status = match result {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed {
                reason: e.to_string(),
            },
        };
        Self {
            action,
            target: target.into(),
            label: label.into(),
            status,
        }
    }

    /// Records a step that was not attempted.
    #[must_use]
    pub fn skipped(
        action: StepAction,
        target: impl Into<String>,
        label: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            target: target.into(),
            label: label.into(),
            status: StepStatus::Skipped {
                reason: reason.into(),
            },
        }
    }

    /// Returns whether the step failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            StepStatus::Succeeded => write!(f, "{} {}: ok", self.action, self.label),
            StepStatus::Failed { reason } => {
                write!(f, "{} {}: failed: {reason}", self.action, self.label)
            }
            StepStatus::Skipped { reason } => {
                write!(f, "{} {}: skipped: {reason}", self.action, self.label)
            }
        }
    }
}

/// Ordered outcomes of a multi-step operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Steps in the order they were decided.
    pub steps: Vec<StepOutcome>,
}

impl ExecutionReport {
    /// Returns whether no step failed. Skipped steps do not count as failures.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.steps.iter().any(StepOutcome::is_failure)
    }

    /// Returns the failed steps.
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.is_failure())
    }

    /// Returns the steps for one action.
    pub fn steps_for(&self, action: StepAction) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(move |s| s.action == action)
    }
}

impl Extend<StepOutcome> for ExecutionReport {
    fn extend<T: IntoIterator<Item = StepOutcome>>(&mut self, iter: T) {
        self.steps.extend(iter);
    }
}
