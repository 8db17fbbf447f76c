//! The `authorities` table: one role per username.
//!
//! Accounts themselves live with the access collaborator; this table only
//! mirrors the authority string so caller roles can be resolved locally.

use rusqlite::{params, OptionalExtension};

use habitat_shared::Role;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace the authority for `username`.
    pub fn upsert_authority(&self, username: &str, authority: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO authorities (username, authority) VALUES (?1, ?2)
             ON CONFLICT(username) DO UPDATE SET authority = excluded.authority",
            params![username, authority],
        )?;
        Ok(())
    }

    /// Raw authority string for `username`, if one is recorded.
    pub fn find_authority(&self, username: &str) -> Result<Option<String>> {
        let authority = self
            .conn()
            .query_row(
                "SELECT authority FROM authorities WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(authority)
    }

    /// Resolve `username` to a role. Unknown users and blank authorities
    /// resolve to `None`.
    pub fn find_role(&self, username: &str) -> Result<Option<Role>> {
        Ok(self
            .find_authority(username)?
            .as_deref()
            .and_then(Role::from_authority))
    }
}
