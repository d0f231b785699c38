use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::transform::{TransformMode, TransformOptions};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Transform,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::Transform => write!(f, "transform"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transform" => Ok(JobType::Transform),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Waiting out a backoff before redelivery
    Retryable,
    /// Dead-lettered
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed(FailureKind),
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed(FailureKind::Retryable) => "failed_retryable",
            JobState::Failed(FailureKind::Terminal) => "failed_terminal",
        }
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, JobState::Failed(FailureKind::Terminal))
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed(FailureKind::Terminal)
        )
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed_retryable" => Ok(JobState::Failed(FailureKind::Retryable)),
            "failed_terminal" => Ok(JobState::Failed(FailureKind::Terminal)),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub state: JobState,
    /// Deliveries so far, including the current one while active.
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn try_payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of a `transform` job.
///
/// `target_image_id` and `source_key` are fixed at submission so every
/// redelivery reads the same bytes and writes the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformJobPayload {
    pub image_id: Uuid,
    pub caller_id: Uuid,
    pub target_image_id: Uuid,
    pub source_key: String,
    #[serde(default)]
    pub mode: TransformMode,
    pub options: TransformOptions,
}
