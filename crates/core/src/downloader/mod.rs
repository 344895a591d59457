//! Download client integration.
//!
//! Downloads are delegated to an external download daemon; the pipeline
//! starts transfers, polls their progress and reads back the final path.

mod http;
mod types;

pub use http::HttpDownloadClient;
pub use types::{
    DownloadClient, DownloadClientError, DownloadHandle, DownloadState, DownloadStatus,
    StartDownloadRequest,
};
