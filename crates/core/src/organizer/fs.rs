//! Filesystem organizer implementation.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors raised while organizing files.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Source path not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Nothing to organize under {0}")]
    EmptySource(PathBuf),

    #[error("Destination template rendered to an empty path")]
    EmptyDestination,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one organize pass.
#[derive(Debug, Clone)]
pub struct OrganizeResult {
    /// Directory the files ended up in.
    pub final_dir: PathBuf,
    /// How many files were placed.
    pub files_moved: usize,
    /// Total bytes placed.
    pub bytes_moved: u64,
}

/// Filesystem-based organizer.
pub struct FsOrganizer;

impl FsOrganizer {
    pub fn new() -> Self {
        Self
    }

    /// Render a destination template like `{author}/{title}` into a relative
    /// path, sanitizing path-hostile characters from the values.
    pub fn render_template(template: &str, author: Option<&str>, title: &str) -> PathBuf {
        let author = sanitize_component(author.unwrap_or("Unknown Author"));
        let title = sanitize_component(title);

        let rendered = template.replace("{author}", &author).replace("{title}", &title);

        rendered
            .split('/')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// Move everything under `source` into `dest_dir`, creating it first.
    ///
    /// Regular files move individually; directories are walked and flattened
    /// one file at a time so a partially transferred tree never blocks the
    /// rest.
    pub async fn organize(
        &self,
        source: &Path,
        dest_dir: &Path,
    ) -> Result<OrganizeResult, OrganizeError> {
        let metadata = fs::metadata(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OrganizeError::SourceNotFound(source.to_path_buf())
            } else {
                OrganizeError::Io {
                    path: source.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if dest_dir.as_os_str().is_empty() {
            return Err(OrganizeError::EmptyDestination);
        }

        fs::create_dir_all(dest_dir).await.map_err(|e| OrganizeError::Io {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        let files = if metadata.is_file() {
            vec![source.to_path_buf()]
        } else {
            collect_files(source).await?
        };

        if files.is_empty() {
            return Err(OrganizeError::EmptySource(source.to_path_buf()));
        }

        let mut files_moved = 0usize;
        let mut bytes_moved = 0u64;

        for file in files {
            let file_name = file
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("file"));
            let destination = dest_dir.join(file_name);

            let size = fs::metadata(&file)
                .await
                .map(|m| m.len())
                .unwrap_or(0);

            move_file(&file, &destination).await?;
            debug!(from = %file.display(), to = %destination.display(), "Placed file");

            files_moved += 1;
            bytes_moved += size;
        }

        Ok(OrganizeResult {
            final_dir: dest_dir.to_path_buf(),
            files_moved,
            bytes_moved,
        })
    }
}

impl Default for FsOrganizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect all regular files under a directory tree.
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>, OrganizeError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| OrganizeError::Io {
            path: dir.clone(),
            source: e,
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| OrganizeError::Io {
            path: dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| OrganizeError::Io {
                path: path.clone(),
                source: e,
            })?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Move a file, renaming when possible and copying across devices.
async fn move_file(source: &Path, destination: &Path) -> Result<(), OrganizeError> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e)
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) =>
        {
            // Cross-filesystem move: copy then remove the original
            fs::copy(source, destination)
                .await
                .map_err(|e| OrganizeError::Io {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
            fs::remove_file(source).await.map_err(|e| OrganizeError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
            Ok(())
        }
        Err(e) => Err(OrganizeError::Io {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

/// Strip path separators and other hostile characters from a template value.
fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.').to_string();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}
