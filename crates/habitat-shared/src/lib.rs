//! # habitat-shared
//!
//! Vocabulary shared by the Habitat store and server crates: identifiers,
//! caller roles, listing buckets, cache keys and the issue lifecycle error
//! taxonomy. Nothing in here performs I/O.

pub mod constants;
pub mod error;
pub mod types;

pub use error::IssueError;
pub use types::{Bucket, CacheKey, Caller, IssueId, Role};
