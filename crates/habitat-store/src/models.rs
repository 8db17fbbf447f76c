//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use habitat_shared::{Bucket, IssueError, IssueId};

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A reported community problem.
///
/// `closed_date` is only ever set on a confirmed issue; the schema enforces
/// this with a `CHECK` constraint as well.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Store-assigned identifier.
    pub id: IssueId,
    /// Free-text description, never blank.
    pub content: String,
    /// Day the issue was submitted.
    pub report_date: NaiveDate,
    /// Whether a host has acknowledged the issue.
    pub confirmed: bool,
    /// Day the issue was closed, if it has been.
    pub closed_date: Option<NaiveDate>,
    /// Username of the resident who filed it.
    pub reporter: String,
    /// Attachments in upload order.
    pub images: Vec<IssueImage>,
}

impl Issue {
    pub fn is_closed(&self) -> bool {
        self.closed_date.is_some()
    }

    /// Which listing partition this issue currently belongs to.
    pub fn bucket(&self) -> Bucket {
        Bucket::classify(self.confirmed, self.is_closed())
    }
}

// ---------------------------------------------------------------------------
// IssueImage
// ---------------------------------------------------------------------------

/// An image attached to an issue. Serialized as its bare media reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct IssueImage {
    /// Opaque reference returned by the image uploader.
    pub media_ref: String,
}

impl IssueImage {
    pub fn new(media_ref: impl Into<String>) -> Self {
        Self {
            media_ref: media_ref.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// NewIssue
// ---------------------------------------------------------------------------

/// Everything needed to persist a freshly submitted issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub content: String,
    pub reporter: String,
    pub report_date: NaiveDate,
    pub images: Vec<IssueImage>,
}

// ---------------------------------------------------------------------------
// Transition outcome
// ---------------------------------------------------------------------------

/// Result of a guarded lifecycle update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Missing,
    AlreadyConfirmed,
    AlreadyClosed,
    NotConfirmed,
}

impl TransitionOutcome {
    /// Turn a rejected transition into the matching lifecycle error.
    pub fn into_result(self, id: IssueId) -> Result<(), IssueError> {
        match self {
            Self::Applied => Ok(()),
            Self::Missing => Err(IssueError::IssueNotFound(id)),
            Self::AlreadyConfirmed => Err(IssueError::AlreadyConfirmed(id)),
            Self::AlreadyClosed => Err(IssueError::AlreadyClosed(id)),
            Self::NotConfirmed => Err(IssueError::NotConfirmed(id)),
        }
    }
}
