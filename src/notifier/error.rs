//! Error types for display delivery.

use std::time::Duration;

use thiserror::Error;

use super::template::TemplateServiceError;

/// Errors that can occur while rendering or delivering a notification.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The display did not answer in time.
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The display answered with a non-success status.
    #[error("Display rejected the notification with status {0}")]
    Rejected(u16),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// An error from the underlying `reqwest` or `reqwest_middleware`
    /// libraries.
    #[error("Request error: {0}")]
    Request(#[from] reqwest_middleware::Error),

    /// A template could not be compiled or rendered.
    #[error("Template error: {0}")]
    Template(#[from] TemplateServiceError),
}
