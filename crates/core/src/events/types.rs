use serde::{Deserialize, Serialize};

/// Severity of a pipeline event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
        }
    }
}

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Request lifecycle
    RequestStateChanged {
        request_id: String,
        from_status: String,
        to_status: String,
        reason: Option<String>,
    },

    // Search events
    SearchExecuted {
        request_id: String,
        query: String,
        candidates_found: u32,
        duration_ms: u64,
    },
    CandidateSelected {
        request_id: String,
        title: String,
        source: String,
        base_score: f32,
        final_score: f32,
    },
    NoCandidateQualified {
        request_id: String,
        evaluated: u32,
        reason: String,
    },

    // Download events
    DownloadStarted {
        request_id: String,
        client_id: String,
        location: String,
    },
    DownloadCompleted {
        request_id: String,
        client_id: String,
        bytes: u64,
    },
    DownloadFailed {
        request_id: String,
        reason: String,
    },

    // Organize events
    FilesOrganized {
        request_id: String,
        final_path: String,
    },
    SidecarSpawned {
        parent_request_id: String,
        request_id: String,
        source: String,
    },

    // Job retry bookkeeping
    JobRetryScheduled {
        job_id: String,
        job_type: String,
        attempts: u32,
        error: String,
    },
    JobExhausted {
        job_id: String,
        job_type: String,
        error: String,
    },
}

impl PipelineEvent {
    /// Event type string for storage and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::ServiceStarted { .. } => "service_started",
            PipelineEvent::ServiceStopped { .. } => "service_stopped",
            PipelineEvent::RequestStateChanged { .. } => "request_state_changed",
            PipelineEvent::SearchExecuted { .. } => "search_executed",
            PipelineEvent::CandidateSelected { .. } => "candidate_selected",
            PipelineEvent::NoCandidateQualified { .. } => "no_candidate_qualified",
            PipelineEvent::DownloadStarted { .. } => "download_started",
            PipelineEvent::DownloadCompleted { .. } => "download_completed",
            PipelineEvent::DownloadFailed { .. } => "download_failed",
            PipelineEvent::FilesOrganized { .. } => "files_organized",
            PipelineEvent::SidecarSpawned { .. } => "sidecar_spawned",
            PipelineEvent::JobRetryScheduled { .. } => "job_retry_scheduled",
            PipelineEvent::JobExhausted { .. } => "job_exhausted",
        }
    }

    /// The request this event concerns, when there is one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::RequestStateChanged { request_id, .. }
            | PipelineEvent::SearchExecuted { request_id, .. }
            | PipelineEvent::CandidateSelected { request_id, .. }
            | PipelineEvent::NoCandidateQualified { request_id, .. }
            | PipelineEvent::DownloadStarted { request_id, .. }
            | PipelineEvent::DownloadCompleted { request_id, .. }
            | PipelineEvent::DownloadFailed { request_id, .. }
            | PipelineEvent::FilesOrganized { request_id, .. } => Some(request_id),
            PipelineEvent::SidecarSpawned { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    /// Default severity for this event type.
    pub fn level(&self) -> EventLevel {
        match self {
            PipelineEvent::DownloadFailed { .. } | PipelineEvent::JobExhausted { .. } => {
                EventLevel::Error
            }
            PipelineEvent::JobRetryScheduled { .. } => EventLevel::Warning,
            _ => EventLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_strings() {
        let event = PipelineEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert!(event.request_id().is_none());
        assert_eq!(event.level(), EventLevel::Info);
    }

    #[test]
    fn test_request_id_extraction() {
        let event = PipelineEvent::RequestStateChanged {
            request_id: "r-1".to_string(),
            from_status: "pending".to_string(),
            to_status: "searching".to_string(),
            reason: None,
        };
        assert_eq!(event.request_id(), Some("r-1"));
    }

    #[test]
    fn test_levels() {
        let failed = PipelineEvent::DownloadFailed {
            request_id: "r-1".to_string(),
            reason: "all locations failed".to_string(),
        };
        assert_eq!(failed.level(), EventLevel::Error);

        let retry = PipelineEvent::JobRetryScheduled {
            job_id: "j-1".to_string(),
            job_type: "search-media".to_string(),
            attempts: 1,
            error: "timeout".to_string(),
        };
        assert_eq!(retry.level(), EventLevel::Warning);

        // A no-qualifier search is an expected outcome, not an error
        let none = PipelineEvent::NoCandidateQualified {
            request_id: "r-1".to_string(),
            evaluated: 5,
            reason: "all below threshold".to_string(),
        };
        assert_eq!(none.level(), EventLevel::Info);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PipelineEvent::CandidateSelected {
            request_id: "r-1".to_string(),
            title: "The Wild Robot [M4B]".to_string(),
            source: "audiobay".to_string(),
            base_score: 82.0,
            final_score: 92.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"candidate_selected\""));

        let parsed: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "candidate_selected");
    }
}
