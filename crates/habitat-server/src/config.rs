//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use habitat_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_MAX_IMAGES_PER_ISSUE, DEFAULT_MAX_IMAGE_SIZE,
    DEFAULT_UPLOAD_TIMEOUT_SECS,
};
use habitat_shared::Role;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Directory where uploaded issue images are written.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Prefix of the media reference handed back for each stored image.
    /// Env: `MEDIA_BASE_URL`
    /// Default: `/media`
    pub media_base_url: String,

    /// Maximum size of one image in bytes.
    /// Env: `MAX_IMAGE_SIZE`
    pub max_image_size: usize,

    /// Maximum number of images on a single issue.
    /// Env: `MAX_IMAGES_PER_ISSUE`
    pub max_images_per_issue: usize,

    /// Per-image upload timeout; expiry counts as an upload failure.
    /// Env: `UPLOAD_TIMEOUT_SECS`
    pub upload_timeout: Duration,

    /// Header carrying the username authenticated by the fronting proxy.
    /// Env: `PRINCIPAL_HEADER`
    /// Default: `x-authenticated-user`
    pub principal_header: String,

    /// `(username, authority)` pairs written to the authority table at
    /// startup.
    /// Env: `BOOTSTRAP_AUTHORITIES` (`alice:ROLE_RESIDENT,hank:ROLE_HOST`)
    pub bootstrap_authorities: Vec<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            media_storage_path: PathBuf::from("./media"),
            media_base_url: "/media".to_string(),
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            max_images_per_issue: DEFAULT_MAX_IMAGES_PER_ISSUE,
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            principal_header: "x-authenticated-user".to_string(),
            bootstrap_authorities: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = lookup("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("MEDIA_BASE_URL") {
            let trimmed = url.trim_end_matches('/');
            if trimmed.is_empty() {
                tracing::warn!(value = %url, "Invalid MEDIA_BASE_URL, using default");
            } else {
                config.media_base_url = trimmed.to_string();
            }
        }

        if let Some(val) = lookup("MAX_IMAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_image_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_IMAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("MAX_IMAGES_PER_ISSUE") {
            match val.parse::<usize>() {
                Ok(n) => config.max_images_per_issue = n,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid MAX_IMAGES_PER_ISSUE, using default")
                }
            }
        }

        if let Some(val) = lookup("UPLOAD_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.upload_timeout = Duration::from_secs(n),
                _ => tracing::warn!(value = %val, "Invalid UPLOAD_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(header) = lookup("PRINCIPAL_HEADER") {
            if !header.trim().is_empty() {
                config.principal_header = header.trim().to_ascii_lowercase();
            }
        }

        if let Some(val) = lookup("BOOTSTRAP_AUTHORITIES") {
            match parse_authorities(&val) {
                Ok(pairs) => config.bootstrap_authorities = pairs,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid BOOTSTRAP_AUTHORITIES, ignoring")
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Largest request body accepted: every image at full size plus slack
    /// for the text fields and multipart framing.
    pub fn max_request_body(&self) -> usize {
        self.max_image_size
            .saturating_mul(self.max_images_per_issue.max(1))
            .saturating_add(1024 * 1024)
    }
}

/// Parse `user:AUTHORITY` pairs separated by commas.
fn parse_authorities(raw: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (user, authority) = entry
            .split_once(':')
            .ok_or_else(|| format!("expected user:AUTHORITY, got '{entry}'"))?;
        let (user, authority) = (user.trim(), authority.trim());
        if user.is_empty() || Role::from_authority(authority).is_none() {
            return Err(format!("invalid entry '{entry}'"));
        }
        pairs.push((user.to_string(), authority.to_string()));
    }
    Ok(pairs)
}
