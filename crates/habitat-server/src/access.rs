//! Access / role collaborator.
//!
//! Authentication happens in front of this service; the authenticated
//! username arrives in a request header. The role is looked up separately
//! through an [`AccessResolver`] and combined into a [`Caller`].

use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::debug;

use habitat_shared::{Caller, Role};

use crate::engine::SharedDatabase;
use crate::error::ServerError;

#[async_trait]
pub trait AccessResolver: Send + Sync {
    /// Role of `username`, or `None` for unknown users.
    async fn resolve(&self, username: &str) -> Result<Option<Role>, ServerError>;
}

/// Resolves roles from the store's `authorities` table.
pub struct StoreAccessResolver {
    db: SharedDatabase,
}

impl StoreAccessResolver {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessResolver for StoreAccessResolver {
    async fn resolve(&self, username: &str) -> Result<Option<Role>, ServerError> {
        Ok(self.db.lock().await.find_role(username)?)
    }
}

/// Build the caller context for a request.
pub async fn authenticate(
    headers: &HeaderMap,
    principal_header: &str,
    resolver: &dyn AccessResolver,
) -> Result<Caller, ServerError> {
    let username = headers
        .get(principal_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("No authenticated principal".into()))?;

    let role = resolver
        .resolve(username)
        .await?
        .ok_or_else(|| ServerError::Unauthorized(format!("No authority for '{username}'")))?;

    debug!(username, role = %role, "Authenticated caller");
    Ok(Caller::new(username, role))
}
