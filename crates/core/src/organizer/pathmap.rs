//! Path translation between a download client's filesystem view and ours.

use crate::config::PathMapConfig;

/// Result of a path translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPath {
    /// The (possibly rewritten) path.
    pub path: String,
    /// Why the path was left unchanged, when it was.
    pub note: Option<String>,
}

/// Rewrite `path` from the remote prefix to the local one.
///
/// Returns the path unchanged (with a diagnostic note) when mapping is
/// disabled, the configuration is incomplete, or the prefix does not match.
pub fn transform(path: &str, map: &PathMapConfig) -> TranslatedPath {
    if !map.enabled {
        return TranslatedPath {
            path: path.to_string(),
            note: Some("path mapping disabled".to_string()),
        };
    }

    if path.is_empty() || map.remote_prefix.is_empty() || map.local_prefix.is_empty() {
        return TranslatedPath {
            path: path.to_string(),
            note: Some("path mapping enabled but a prefix or the path is empty".to_string()),
        };
    }

    match path.strip_prefix(&map.remote_prefix) {
        Some(rest) => TranslatedPath {
            path: format!("{}{}", map.local_prefix, rest),
            note: None,
        },
        None => TranslatedPath {
            path: path.to_string(),
            note: Some(format!(
                "path does not start with remote prefix {}",
                map.remote_prefix
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(enabled: bool) -> PathMapConfig {
        PathMapConfig {
            enabled,
            remote_prefix: "/remote".to_string(),
            local_prefix: "/local".to_string(),
        }
    }

    #[test]
    fn test_transform_rewrites_prefix() {
        let result = transform("/remote/a/b", &map(true));
        assert_eq!(result.path, "/local/a/b");
        assert!(result.note.is_none());
    }

    #[test]
    fn test_transform_disabled_is_identity() {
        let result = transform("/remote/a/b", &map(false));
        assert_eq!(result.path, "/remote/a/b");
        assert!(result.note.is_some());
    }

    #[test]
    fn test_transform_non_matching_prefix_unchanged() {
        let result = transform("/elsewhere/a/b", &map(true));
        assert_eq!(result.path, "/elsewhere/a/b");
        assert!(result.note.unwrap().contains("/remote"));
    }

    #[test]
    fn test_transform_empty_inputs_unchanged() {
        let result = transform("", &map(true));
        assert_eq!(result.path, "");
        assert!(result.note.is_some());

        let incomplete = PathMapConfig {
            enabled: true,
            remote_prefix: String::new(),
            local_prefix: "/local".to_string(),
        };
        let result = transform("/remote/a", &incomplete);
        assert_eq!(result.path, "/remote/a");
        assert!(result.note.is_some());
    }
}
