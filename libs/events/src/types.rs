//! Workflow job event payloads.
//!
//! Only the fields the scheduler reads are modelled. Everything else in the
//! webhook body is ignored, and a `null` field decodes like a missing one.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EventError;

// =============================================================================
// Action
// =============================================================================

/// Lifecycle action carried by a workflow job event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobAction {
    /// The job is waiting for a runner.
    Queued,
    /// The job finished.
    Completed,
    /// Any other action (`in_progress`, `waiting`, ...). Kept verbatim.
    Other(String),
    /// The payload carried no action at all.
    #[default]
    Missing,
}

impl JobAction {
    pub fn as_str(&self) -> &str {
        match self {
            JobAction::Queued => "queued",
            JobAction::Completed => "completed",
            JobAction::Other(action) => action,
            JobAction::Missing => "",
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, JobAction::Queued)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobAction::Completed)
    }
}

impl From<String> for JobAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => JobAction::Queued,
            "completed" => JobAction::Completed,
            "" => JobAction::Missing,
            _ => JobAction::Other(value),
        }
    }
}

impl From<JobAction> for String {
    fn from(value: JobAction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Decode an explicit `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Repository that triggered the event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    /// `<owner>/<repo>`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
}

impl Repository {
    /// The owning user or organization (the part before the first `/`).
    pub fn owner(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(&self.full_name)
    }
}

/// Job information attached to the event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowJob {
    #[serde(default, deserialize_with = "null_as_default")]
    pub run_id: i64,
    /// Informational only.
    #[serde(default, deserialize_with = "null_as_default")]
    pub workflow_name: String,
    /// Labels in the order they were declared on the job.
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
}

/// A decoded `workflow_job` webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowJobEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: JobAction,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repository: Repository,
    #[serde(default, deserialize_with = "null_as_default")]
    pub workflow_job: WorkflowJob,
}

impl WorkflowJobEvent {
    /// Decode an event from a raw webhook body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn labels(&self) -> &[String] {
        &self.workflow_job.labels
    }
}
