//! Job kinds and the job lifecycle state machine.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Pipeline kind of a job; selects which pipeline function runs it.
///
/// Names outside the known set are kept as [`JobType::Other`] so a job with
/// an unsupported type is still recorded, and then fails at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    TopicGeneration,
    ContentGeneration,
    Finishing,
    ImageGeneration,
    Publish,
    /// Topic → content → optional finishing → images → publish.
    CompositePipeline,
    Other(String),
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::TopicGeneration,
        JobType::ContentGeneration,
        JobType::Finishing,
        JobType::ImageGeneration,
        JobType::Publish,
        JobType::CompositePipeline,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobType::TopicGeneration => "topic_generation",
            JobType::ContentGeneration => "content_generation",
            JobType::Finishing => "finishing",
            JobType::ImageGeneration => "image_generation",
            JobType::Publish => "publish",
            JobType::CompositePipeline => "composite_pipeline",
            JobType::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, JobType::Other(_))
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobType {
    /// Known names match in `snake_case` or `kebab-case`; anything else is kept verbatim.
    fn from(s: String) -> Self {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or_else(|| JobType::Other(s))
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        match job_type {
            JobType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    /// Only a blank name is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::validation("job type must not be empty"));
        }
        Ok(JobType::from(s.to_string()))
    }
}

/// Lifecycle status of a job.
///
/// ```text
/// pending ──► running ──► completed
///    │           ├──────► failed
///    └───────────┴──────► cancelled
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether an explicit cancel request can still be honored.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Validate a transition, returning the target on success.
    pub fn transition(&self, next: JobStatus) -> Result<JobStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_transition(self.as_str(), next.as_str()))
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for from in ALL_STATUSES.into_iter().filter(JobStatus::is_terminal) {
            for to in ALL_STATUSES {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn pending_cannot_skip_running() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn running_reaches_every_terminal_state() {
        for to in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert_eq!(JobStatus::Running.transition(to), Ok(to));
        }
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = JobStatus::Completed
            .transition(JobStatus::Running)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid transition: completed -> running");
    }

    #[test]
    fn job_type_parses_snake_and_kebab_case() {
        assert_eq!("composite_pipeline".parse::<JobType>(), Ok(JobType::CompositePipeline));
        assert_eq!("image-generation".parse::<JobType>(), Ok(JobType::ImageGeneration));
        assert!("  ".parse::<JobType>().is_err());
    }

    #[test]
    fn unsupported_job_type_is_kept_by_name() {
        let job_type: JobType = "generate-post".parse().unwrap();
        assert_eq!(job_type, JobType::Other("generate-post".into()));
        assert!(!job_type.is_known());
        assert_eq!(job_type.to_string(), "generate-post");

        let json = serde_json::to_string(&job_type).unwrap();
        assert_eq!(json, "\"generate-post\"");
        let back: JobType = serde_json::from_str("\"Content-Generation\"").unwrap();
        assert_eq!(back, JobType::ContentGeneration);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&JobType::TopicGeneration).unwrap();
        assert_eq!(json, "\"topic_generation\"");
        let status: JobStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, JobStatus::Cancelled);
    }
}
