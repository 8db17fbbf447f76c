use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTHORITY_HOST, AUTHORITY_RESIDENT, GLOBAL_CACHE_KEY, RESIDENT_CACHE_PREFIX,
};

// Issue identity = store-assigned row id, immutable once created
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct IssueId(pub i64);

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for IssueId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reports issues and sees only their own.
    Resident,
    /// Confirms and closes any issue and sees all of them.
    Host,
}

impl Role {
    /// Map a stored authority string to a role.
    ///
    /// Only `ROLE_RESIDENT` yields a resident; every other non-empty
    /// authority is staff and gets host capabilities.
    pub fn from_authority(authority: &str) -> Option<Self> {
        match authority.trim() {
            "" => None,
            AUTHORITY_RESIDENT => Some(Self::Resident),
            _ => Some(Self::Host),
        }
    }

    pub fn as_authority(&self) -> &'static str {
        match self {
            Self::Resident => AUTHORITY_RESIDENT,
            Self::Host => AUTHORITY_HOST,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resident => write!(f, "resident"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// The authenticated principal on whose behalf an engine call runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn resident(username: impl Into<String>) -> Self {
        Self::new(username, Role::Resident)
    }

    pub fn host(username: impl Into<String>) -> Self {
        Self::new(username, Role::Host)
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Key of a cached, already ordered listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Global,
    Resident(String),
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "{GLOBAL_CACHE_KEY}"),
            Self::Resident(username) => write!(f, "{RESIDENT_CACHE_PREFIX}{username}"),
        }
    }
}

/// Listing partition an issue falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// `confirmed == false`, oldest report first.
    NotConfirmed,
    /// Confirmed but not yet closed, oldest report first.
    ConfirmedOpen,
    /// Closed, most recently closed first.
    Closed,
}

impl Bucket {
    /// Fixed order in which buckets are concatenated in every listing.
    pub const LISTING_ORDER: [Bucket; 3] = [Self::NotConfirmed, Self::ConfirmedOpen, Self::Closed];

    pub fn classify(confirmed: bool, closed: bool) -> Self {
        match (confirmed, closed) {
            (_, true) => Self::Closed,
            (true, false) => Self::ConfirmedOpen,
            (false, false) => Self::NotConfirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_authority() {
        assert_eq!(Role::from_authority("ROLE_RESIDENT"), Some(Role::Resident));
        assert_eq!(Role::from_authority("ROLE_HOST"), Some(Role::Host));
        assert_eq!(Role::from_authority("ROLE_STAFF"), Some(Role::Host));
        assert_eq!(Role::from_authority("  "), None);
    }

    #[test]
    fn test_cache_key_display() {
        assert_eq!(CacheKey::Global.to_string(), "global");
        assert_eq!(
            CacheKey::Resident("alice".into()).to_string(),
            "resident:alice"
        );
    }

    #[test]
    fn test_bucket_classify() {
        assert_eq!(Bucket::classify(false, false), Bucket::NotConfirmed);
        assert_eq!(Bucket::classify(true, false), Bucket::ConfirmedOpen);
        assert_eq!(Bucket::classify(true, true), Bucket::Closed);
    }

    #[test]
    fn test_issue_id_serializes_as_number() {
        let json = serde_json::to_string(&IssueId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!("17".parse::<IssueId>().unwrap(), IssueId(17));
    }
}
