// Constants module for shared names and defaults

pub const CONFIG_FILE: &str = "config.toml";
pub const CATALOG_FILE: &str = "catalog.json";
pub const CONFIG_DIR_NAME: &str = "install-unity";
pub const CONFIG_DIR_ENV: &str = "IU_DIR";

/// Marker written into every installation this tool creates
pub const INSTALL_MARKER_FILE: &str = ".install-unity.toml";

/// Folder under the user's downloads directory used when none is configured
pub const DOWNLOAD_DIRECTORY: &str = "Unity Packages";

/// Placeholder in module destinations that expands to the installation root
pub const UNITY_PATH_PLACEHOLDER: &str = "{UNITY_PATH}";

/// Catalog snapshot format. A different value on disk discards the cached catalog.
/// Increment only on breaking changes to the persisted release records.
pub const CATALOG_FORMAT: u32 = 2;

pub const USER_AGENT: &str = concat!("install-unity/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 1;
pub const DEFAULT_MAX_CONCURRENT_INSTALLS: usize = 1;
pub const DEFAULT_RETRY_COUNT: u32 = 4;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
pub const DEFAULT_THROUGHPUT_WINDOW: usize = 5000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CATALOG_MAX_AGE_HOURS: u64 = 24;
pub const DEFAULT_INSTALL_PATH: &str = "Unity {version}";
