use thiserror::Error;

use crate::types::IssueId;

/// Failures of the issue lifecycle, surfaced synchronously to the caller.
///
/// None of these are retried automatically. Replaying a rejected transition
/// must reproduce the same error (a second confirm is still
/// [`IssueError::AlreadyConfirmed`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    #[error("Issue doesn't exist: {0}")]
    IssueNotFound(IssueId),

    #[error("Issue is already confirmed: {0}")]
    AlreadyConfirmed(IssueId),

    #[error("Issue is already closed: {0}")]
    AlreadyClosed(IssueId),

    #[error("Issue cannot be closed before it is confirmed: {0}")]
    NotConfirmed(IssueId),

    #[error("Image upload failed: {0}")]
    UploadFailure(String),

    #[error("Issue content must not be blank")]
    InvalidContent,

    #[error("Forbidden: {0}")]
    Forbidden(String),
}
