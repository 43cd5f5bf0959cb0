// Config module: persisted settings, their schema and derived paths

use crate::constants;
use crate::version::VersionIdentity;
use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User settings, stored as TOML in the config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub max_concurrent_downloads: usize,
    pub max_concurrent_installs: usize,
    pub retry_count: u32,
    /// Seconds
    pub retry_delay: u64,
    /// Seconds
    pub request_timeout: u64,
    pub resume_downloads: bool,
    pub chunk_size: usize,
    pub throughput_window: usize,
    /// Milliseconds
    pub poll_interval: u64,
    pub download_directory: String,
    pub install_path: String,
    /// Hours
    pub catalog_max_age: u64,
    pub default_packages: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: constants::DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_concurrent_installs: constants::DEFAULT_MAX_CONCURRENT_INSTALLS,
            retry_count: constants::DEFAULT_RETRY_COUNT,
            retry_delay: constants::DEFAULT_RETRY_DELAY_SECS,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            resume_downloads: true,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            throughput_window: constants::DEFAULT_THROUGHPUT_WINDOW,
            poll_interval: constants::DEFAULT_POLL_INTERVAL_MS,
            download_directory: String::new(),
            install_path: String::new(),
            catalog_max_age: constants::DEFAULT_CATALOG_MAX_AGE_HOURS,
            default_packages: Vec::new(),
        }
    }
}

/// Value kind of a configuration option, used for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Integer,
    Boolean,
    Text,
    List,
}

impl OptionKind {
    pub fn name(self) -> &'static str {
        match self {
            OptionKind::Integer => "integer",
            OptionKind::Boolean => "boolean",
            OptionKind::Text => "text",
            OptionKind::List => "list",
        }
    }
}

/// One entry of the configuration schema
pub struct ConfigOption {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: &'static str,
    pub description: &'static str,
    pub get: fn(&Configuration) -> String,
    pub set: fn(&mut Configuration, &str) -> anyhow::Result<()>,
}

/// Every configurable option, in display order
pub static OPTIONS: &[ConfigOption] = &[
    ConfigOption {
        name: "maxConcurrentDownloads",
        kind: OptionKind::Integer,
        default: "1",
        description: "Number of packages downloaded at the same time",
        get: |c| c.max_concurrent_downloads.to_string(),
        set: |c, v| {
            c.max_concurrent_downloads = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "maxConcurrentInstalls",
        kind: OptionKind::Integer,
        default: "1",
        description: "Number of packages installed at the same time",
        get: |c| c.max_concurrent_installs.to_string(),
        set: |c, v| {
            c.max_concurrent_installs = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "retryCount",
        kind: OptionKind::Integer,
        default: "4",
        description: "Download attempts per package before giving up",
        get: |c| c.retry_count.to_string(),
        set: |c, v| {
            c.retry_count = parse_number(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "retryDelay",
        kind: OptionKind::Integer,
        default: "5",
        description: "Seconds to wait before retrying a failed download",
        get: |c| c.retry_delay.to_string(),
        set: |c, v| {
            c.retry_delay = parse_number(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "requestTimeout",
        kind: OptionKind::Integer,
        default: "60",
        description: "Seconds without response before a request fails",
        get: |c| c.request_timeout.to_string(),
        set: |c, v| {
            c.request_timeout = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "resumeDownloads",
        kind: OptionKind::Boolean,
        default: "true",
        description: "Continue partial downloads instead of starting over",
        get: |c| c.resume_downloads.to_string(),
        set: |c, v| {
            c.resume_downloads = parse_bool(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "chunkSize",
        kind: OptionKind::Integer,
        default: "524288",
        description: "Bytes read from the network per chunk",
        get: |c| c.chunk_size.to_string(),
        set: |c, v| {
            c.chunk_size = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "throughputWindow",
        kind: OptionKind::Integer,
        default: "5000",
        description: "Chunks used to compute the current download speed",
        get: |c| c.throughput_window.to_string(),
        set: |c, v| {
            c.throughput_window = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "pollInterval",
        kind: OptionKind::Integer,
        default: "100",
        description: "Milliseconds between queue status checks",
        get: |c| c.poll_interval.to_string(),
        set: |c, v| {
            c.poll_interval = parse_positive(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "downloadDirectory",
        kind: OptionKind::Text,
        default: "",
        description: "Where packages are downloaded, empty for the downloads folder",
        get: |c| c.download_directory.clone(),
        set: |c, v| {
            c.download_directory = v.trim().to_string();
            Ok(())
        },
    },
    ConfigOption {
        name: "installPath",
        kind: OptionKind::Text,
        default: "",
        description: "Installation path template, supports {version} {major} {minor} {patch} {type} {build} {hash}",
        get: |c| c.install_path.clone(),
        set: |c, v| {
            c.install_path = v.trim().to_string();
            Ok(())
        },
    },
    ConfigOption {
        name: "catalogMaxAge",
        kind: OptionKind::Integer,
        default: "24",
        description: "Hours before the release catalog is considered outdated",
        get: |c| c.catalog_max_age.to_string(),
        set: |c, v| {
            c.catalog_max_age = parse_number(v)?;
            Ok(())
        },
    },
    ConfigOption {
        name: "defaultPackages",
        kind: OptionKind::List,
        default: "",
        description: "Comma separated packages installed when none are given",
        get: |c| c.default_packages.join(","),
        set: |c, v| {
            c.default_packages = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            Ok(())
        },
    },
];

/// Look up an option by name, ignoring case
pub fn option(name: &str) -> Option<&'static ConfigOption> {
    OPTIONS.iter().find(|o| o.name.eq_ignore_ascii_case(name))
}

fn parse_number<T: std::str::FromStr>(value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid number", value))
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(value: &str) -> anyhow::Result<T> {
    let number: T = parse_number(value)?;
    if number <= T::default() {
        anyhow::bail!("'{}' must be greater than zero", value);
    }
    Ok(number)
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("'{}' is not a valid boolean", value),
    }
}

impl Configuration {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse configuration '{}'", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write configuration '{}'", path.display()))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> anyhow::Result<String> {
        let option = option(name).ok_or_else(|| anyhow::anyhow!("Unknown option '{}'", name))?;
        Ok((option.get)(self))
    }

    pub fn set(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        let option = option(name).ok_or_else(|| anyhow::anyhow!("Unknown option '{}'", name))?;
        (option.set)(self, value).with_context(|| format!("Invalid value for '{}'", option.name))
    }

    pub fn reset(&mut self, name: &str) -> anyhow::Result<()> {
        let option = option(name).ok_or_else(|| anyhow::anyhow!("Unknown option '{}'", name))?;
        (option.set)(self, option.default)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn catalog_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.catalog_max_age as i64)
    }

    /// Root directory for package downloads
    pub fn download_dir(&self) -> PathBuf {
        if !self.download_directory.is_empty() {
            return PathBuf::from(&self.download_directory);
        }
        if let Ok(dir) = std::env::var(constants::CONFIG_DIR_ENV) {
            return PathBuf::from(dir).join("downloads");
        }
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join(constants::DOWNLOAD_DIRECTORY)
    }

    /// Download directory for one release
    pub fn download_dir_for(&self, version: &VersionIdentity) -> PathBuf {
        self.download_dir().join(version.short())
    }

    /// Installation path template, absolute
    pub fn install_path_template(&self) -> String {
        let template = if self.install_path.is_empty() {
            constants::DEFAULT_INSTALL_PATH
        } else {
            self.install_path.as_str()
        };
        if Path::new(template).is_absolute() {
            template.to_string()
        } else {
            default_install_root().join(template).to_string_lossy().into_owned()
        }
    }

    /// Installation path of a release
    pub fn install_path_for(&self, version: &VersionIdentity) -> PathBuf {
        PathBuf::from(expand_template(&self.install_path_template(), version))
    }

    /// Directory scanned for existing installations: the template up to its first
    /// placeholder component, or its parent when it has none
    pub fn install_root(&self) -> PathBuf {
        self.split_install_template().0
    }

    /// Levels below `install_root` at which installations sit
    pub fn install_scan_depth(&self) -> usize {
        self.split_install_template().1
    }

    fn split_install_template(&self) -> (PathBuf, usize) {
        let template = self.install_path_template();
        let components: Vec<_> = Path::new(&template).components().collect();
        let split = components
            .iter()
            .position(|c| c.as_os_str().to_string_lossy().contains('{'))
            .unwrap_or(components.len().saturating_sub(1));
        if split == 0 {
            return (default_install_root(), 1);
        }
        let root: PathBuf = components[..split].iter().collect();
        (root, components.len() - split)
    }
}

/// Expand version placeholders in a path template
pub fn expand_template(template: &str, version: &VersionIdentity) -> String {
    let number = |n: i32| if n >= 0 { n.to_string() } else { String::new() };
    template
        .replace("{version}", &version.short())
        .replace("{major}", &number(version.major))
        .replace("{minor}", &number(version.minor))
        .replace("{patch}", &number(version.patch))
        .replace(
            "{type}",
            &version
                .release_type
                .letter()
                .map(String::from)
                .unwrap_or_default(),
        )
        .replace("{build}", &number(version.build))
        .replace("{hash}", version.hash.as_deref().unwrap_or(""))
}

pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(constants::CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::CONFIG_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    config_dir().join(constants::CONFIG_FILE)
}

pub fn catalog_path() -> PathBuf {
    config_dir().join(constants::CATALOG_FILE)
}

fn default_install_root() -> PathBuf {
    if let Ok(dir) = std::env::var(constants::CONFIG_DIR_ENV) {
        return PathBuf::from(dir).join("editors");
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "macos") {
        home.join("Applications")
    } else {
        home.join("Unity").join("Hub").join("Editor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ReleaseType;
    use tempfile::TempDir;

    #[test]
    fn test_option_names_are_unique() {
        for (i, a) in OPTIONS.iter().enumerate() {
            for b in &OPTIONS[i + 1..] {
                assert!(!a.name.eq_ignore_ascii_case(b.name), "duplicate {}", a.name);
            }
        }
    }

    #[test]
    fn test_defaults_match_schema() {
        let defaults = Configuration::default();
        for option in OPTIONS {
            assert_eq!((option.get)(&defaults), option.default, "{}", option.name);
        }
    }

    #[test]
    fn test_set_and_reset() {
        let mut config = Configuration::default();
        config.set("maxconcurrentdownloads", "3").unwrap();
        config.set("resumeDownloads", "no").unwrap();
        config.set("defaultPackages", "Unity, ios ,android").unwrap();

        assert_eq!(config.max_concurrent_downloads, 3);
        assert!(!config.resume_downloads);
        assert_eq!(config.default_packages, vec!["Unity", "ios", "android"]);
        assert_eq!(config.get("defaultPackages").unwrap(), "Unity,ios,android");

        config.reset("maxConcurrentDownloads").unwrap();
        assert_eq!(config.max_concurrent_downloads, 1);
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Configuration::default();
        assert!(config.set("maxConcurrentInstalls", "0").is_err());
        assert!(config.set("retryCount", "many").is_err());
        assert!(config.set("resumeDownloads", "maybe").is_err());
        assert!(config.set("noSuchOption", "1").is_err());
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Configuration::default();
        config.set("retryCount", "7").unwrap();
        config.set("installPath", "/opt/unity/{major}.{minor}/{version}").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Configuration::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let missing = Configuration::load_from(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(missing, Configuration::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "retryCount = 2\n").unwrap();

        let loaded = Configuration::load_from(&path).unwrap();
        assert_eq!(loaded.retry_count, 2);
        assert_eq!(loaded.chunk_size, constants::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_expand_template() {
        let version = VersionIdentity::new(2019, 4, 31, ReleaseType::Final, 1).with_hash("bd5abf232a62");
        assert_eq!(
            expand_template("/opt/{major}.{minor}/Unity {version} {type}{build} {hash}", &version),
            "/opt/2019.4/Unity 2019.4.31f1 f1 bd5abf232a62"
        );
    }

    #[test]
    fn test_absolute_install_path() {
        let mut config = Configuration::default();
        config.set("installPath", "/opt/unity/{version}").unwrap();
        let version = VersionIdentity::new(2021, 3, 0, ReleaseType::Final, 1);
        assert_eq!(config.install_path_for(&version), PathBuf::from("/opt/unity/2021.3.0f1"));
        assert_eq!(config.install_root(), PathBuf::from("/opt/unity"));
        assert_eq!(config.install_scan_depth(), 1);

        config.set("installPath", "/opt/Unity").unwrap();
        assert_eq!(config.install_root(), PathBuf::from("/opt"));
        assert_eq!(config.install_scan_depth(), 1);
    }

    #[test]
    fn test_nested_install_path_root() {
        let mut config = Configuration::default();
        config.set("installPath", "/opt/unity/{major}.{minor}/Unity {version}").unwrap();
        let version = VersionIdentity::new(2021, 3, 0, ReleaseType::Final, 1);
        assert_eq!(
            config.install_path_for(&version),
            PathBuf::from("/opt/unity/2021.3/Unity 2021.3.0f1")
        );
        assert_eq!(config.install_root(), PathBuf::from("/opt/unity"));
        assert_eq!(config.install_scan_depth(), 2);
    }
}
