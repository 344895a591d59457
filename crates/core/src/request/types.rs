//! Core request data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a request is for the wanted work itself or a dependent companion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// The primary media item (audiobook).
    Primary,
    /// A dependent companion item (e-book), spawned after its parent
    /// completed.
    Sidecar,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Primary => "primary",
            RequestKind::Sidecar => "sidecar",
        }
    }

    pub fn parse(s: &str) -> Option<RequestKind> {
        match s {
            "primary" => Some(RequestKind::Primary),
            "sidecar" => Some(RequestKind::Sidecar),
            _ => None,
        }
    }
}

/// Current status of a request.
///
/// State machine flow:
/// ```text
/// pending -> searching -> downloading -> processing -> downloaded/available
///                |  ^
///                v  |
///          awaiting_search
///
/// Any non-terminal state can transition to failed. A failed request can be
/// reset to pending; an awaiting_search sidecar can be reset the same way.
/// ```
///
/// `awaiting_search` is not an error state: it means content was not
/// available yet and a scheduled sweep will search again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Searching,
    AwaitingSearch,
    Downloading,
    Processing,
    Downloaded,
    Available,
    Failed,
}

impl RequestStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Downloaded | RequestStatus::Available | RequestStatus::Failed
        )
    }

    /// Returns true if the request finished with its content in place.
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestStatus::Downloaded | RequestStatus::Available)
    }

    /// Returns true if a transition from `self` to `to` is allowed.
    pub fn can_transition(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        match (*self, to) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Searching) => true,
            (Searching, AwaitingSearch) => true,
            (Searching, Downloading) => true,
            (AwaitingSearch, Searching) => true,
            (AwaitingSearch, Pending) => true,
            (Downloading, Processing) => true,
            (Processing, Downloaded) => true,
            (Processing, Available) => true,
            (Failed, Pending) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Searching => "searching",
            RequestStatus::AwaitingSearch => "awaiting_search",
            RequestStatus::Downloading => "downloading",
            RequestStatus::Processing => "processing",
            RequestStatus::Downloaded => "downloaded",
            RequestStatus::Available => "available",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<RequestStatus> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "searching" => Some(RequestStatus::Searching),
            "awaiting_search" => Some(RequestStatus::AwaitingSearch),
            "downloading" => Some(RequestStatus::Downloading),
            "processing" => Some(RequestStatus::Processing),
            "downloaded" => Some(RequestStatus::Downloaded),
            "available" => Some(RequestStatus::Available),
            "failed" => Some(RequestStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of desired content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// Unique identifier (UUID).
    pub id: String,

    /// Primary or sidecar.
    pub kind: RequestKind,

    /// For sidecar requests, the completed primary request that spawned it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_request_id: Option<String>,

    /// For sidecar requests, the direct-fetch source this request targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_source: Option<String>,

    /// Title of the wanted work.
    pub title: String,

    /// Author(s), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// External catalog id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// Preferred file format (sidecar requests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<String>,

    /// Runtime in minutes, when known. Feeds the ranking size stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,

    /// Current status.
    pub status: RequestStatus,

    /// Download progress (0-100).
    pub progress: f32,

    /// How many times this request has entered `searching`. Informational;
    /// retry caps live on individual jobs, not here.
    pub search_attempts: u32,

    /// When the last search started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_search_at: Option<DateTime<Utc>>,

    /// Human-readable reason for the current status, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker set by external collaborators. In-flight jobs
    /// check it and exit early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AcquisitionRequest {
    /// Returns true if the request was soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RequestStatus::Downloaded.is_terminal());
        assert!(RequestStatus::Available.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::AwaitingSearch.is_terminal());
    }

    #[test]
    fn test_completed_states() {
        assert!(RequestStatus::Downloaded.is_completed());
        assert!(RequestStatus::Available.is_completed());
        assert!(!RequestStatus::Failed.is_completed());
        assert!(!RequestStatus::Processing.is_completed());
    }

    #[test]
    fn test_happy_path_transitions() {
        use RequestStatus::*;
        assert!(Pending.can_transition(Searching));
        assert!(Searching.can_transition(Downloading));
        assert!(Downloading.can_transition(Processing));
        assert!(Processing.can_transition(Available));
        assert!(Processing.can_transition(Downloaded));
    }

    #[test]
    fn test_awaiting_search_loop() {
        use RequestStatus::*;
        assert!(Searching.can_transition(AwaitingSearch));
        assert!(AwaitingSearch.can_transition(Searching));
        assert!(AwaitingSearch.can_transition(Pending));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        use RequestStatus::*;
        for from in [Pending, Searching, AwaitingSearch, Downloading, Processing] {
            assert!(from.can_transition(Failed), "{} -> failed", from);
        }
        assert!(!Downloaded.can_transition(Failed));
        assert!(!Available.can_transition(Failed));
        assert!(!Failed.can_transition(Failed));
    }

    #[test]
    fn test_retry_edges() {
        use RequestStatus::*;
        assert!(Failed.can_transition(Pending));
        assert!(!Downloaded.can_transition(Pending));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        use RequestStatus::*;
        assert!(!Pending.can_transition(Downloading));
        assert!(!Searching.can_transition(Processing));
        assert!(!Downloading.can_transition(Available));
        assert!(!Available.can_transition(Searching));
    }

    #[test]
    fn test_status_string_round_trip() {
        use RequestStatus::*;
        for status in [
            Pending,
            Searching,
            AwaitingSearch,
            Downloading,
            Processing,
            Downloaded,
            Available,
            Failed,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&RequestStatus::AwaitingSearch).unwrap();
        assert_eq!(json, "\"awaiting_search\"");
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(RequestKind::parse("primary"), Some(RequestKind::Primary));
        assert_eq!(RequestKind::parse("sidecar"), Some(RequestKind::Sidecar));
        assert_eq!(RequestKind::parse("other"), None);
    }
}
