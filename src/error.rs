//! Error Handling Module
//!
//! This module defines custom error types for Inboxer using the `thiserror` crate.
//! Validation findings (issues, warnings, suggestions) are data and never show up here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboxerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown email client: {0}")]
    UnknownClient(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Input too large: {0}")]
    InputTooLarge(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("All models failed: {0}")]
    AllModelsFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Pipeline fault: {0}")]
    Pipeline(String),
}

pub type Result<T> = std::result::Result<T, InboxerError>;
