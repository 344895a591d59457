//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job type discriminant, used for claim filtering and dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    SearchMedia,
    SearchSidecar,
    StartDownload,
    MonitorDownload,
    OrganizeFiles,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SearchMedia => "search-media",
            JobType::SearchSidecar => "search-sidecar",
            JobType::StartDownload => "start-download",
            JobType::MonitorDownload => "monitor-download",
            JobType::OrganizeFiles => "organize-files",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "search-media" => Some(JobType::SearchMedia),
            "search-sidecar" => Some(JobType::SearchSidecar),
            "start-download" => Some(JobType::StartDownload),
            "monitor-download" => Some(JobType::MonitorDownload),
            "organize-files" => Some(JobType::OrganizeFiles),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the search step is looking for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchTarget {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Wanted file format (sidecar searches).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<String>,
}

/// Type-specific job payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobPayload {
    /// Search for the primary media item and select a candidate.
    SearchMedia {
        request_id: String,
        target: SearchTarget,
    },

    /// Search a single direct-fetch source for a companion e-book.
    SearchSidecar {
        request_id: String,
        source: String,
        target: SearchTarget,
    },

    /// Hand the selected candidate to the download client, falling back
    /// through the known locations in order.
    StartDownload {
        request_id: String,
        history_id: String,
        download_urls: Vec<String>,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size_bytes: Option<u64>,
    },

    /// Poll the download client for progress.
    MonitorDownload {
        request_id: String,
        client_id: String,
    },

    /// Move completed files into the library.
    OrganizeFiles {
        request_id: String,
        source_path: String,
        dest_template: String,
    },
}

impl JobPayload {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::SearchMedia { .. } => JobType::SearchMedia,
            JobPayload::SearchSidecar { .. } => JobType::SearchSidecar,
            JobPayload::StartDownload { .. } => JobType::StartDownload,
            JobPayload::MonitorDownload { .. } => JobType::MonitorDownload,
            JobPayload::OrganizeFiles { .. } => JobType::OrganizeFiles,
        }
    }

    /// The request this job works on.
    pub fn request_id(&self) -> &str {
        match self {
            JobPayload::SearchMedia { request_id, .. }
            | JobPayload::SearchSidecar { request_id, .. }
            | JobPayload::StartDownload { request_id, .. }
            | JobPayload::MonitorDownload { request_id, .. }
            | JobPayload::OrganizeFiles { request_id, .. } => request_id,
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One unit of durable, retryable asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier (UUID).
    pub id: String,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Failed runs so far. Never exceeds `max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be claimed (backoff / delayed polls).
    pub run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Structured output stored on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Returns true when the job can never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}
