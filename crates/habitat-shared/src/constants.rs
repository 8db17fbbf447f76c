/// Application name
pub const APP_NAME: &str = "Habitat";

/// Stored authority string for residents.
pub const AUTHORITY_RESIDENT: &str = "ROLE_RESIDENT";

/// Stored authority string for hosts.
pub const AUTHORITY_HOST: &str = "ROLE_HOST";

/// Cache key of the listing that spans every resident.
pub const GLOBAL_CACHE_KEY: &str = "global";

/// Prefix of per-resident listing cache keys.
pub const RESIDENT_CACHE_PREFIX: &str = "resident:";

/// Date format used for `report_date` / `closed_date` at rest and on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Default maximum size of a single uploaded image (10 MiB)
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of images attached to one issue
pub const DEFAULT_MAX_IMAGES_PER_ISSUE: usize = 10;

/// Default per-image upload timeout in seconds
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
