// Release and package data model shared by the catalog, resolver and queue

use crate::version::VersionIdentity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved id of the editor package, compared case-insensitively
pub const EDITOR_PACKAGE_ID: &str = "Unity";

/// Target operating system of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mac" | "macos" | "osx" => Some(Platform::Mac),
            "windows" | "win" => Some(Platform::Windows),
            "linux" => Some(Platform::Linux),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Mac => "mac",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        })
    }
}

/// CPU architecture of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    Arm64,
}

impl Architecture {
    pub fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Architecture::Arm64
        } else {
            Architecture::X64
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Some(Architecture::X64),
            "arm64" | "aarch64" => Some(Architecture::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
        })
    }
}

/// Container format of a downloadable file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Undefined,
    Zip,
    Pkg,
    Dmg,
    Exe,
    Po,
    Text,
}

impl FileType {
    /// Guess the file type from a URL or file name extension
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        match path.rsplit('.').next() {
            Some("zip") => FileType::Zip,
            Some("pkg") => FileType::Pkg,
            Some("dmg") => FileType::Dmg,
            Some("exe") => FileType::Exe,
            Some("po") => FileType::Po,
            Some("txt") | Some("md") => FileType::Text,
            _ => FileType::Undefined,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Undefined => "undefined",
            FileType::Zip => "zip",
            FileType::Pkg => "pkg",
            FileType::Dmg => "dmg",
            FileType::Exe => "exe",
            FileType::Po => "po",
            FileType::Text => "text",
        })
    }
}

/// Fields shared by the editor download and every module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub url: String,
    /// Integrity hash, "algorithm:hex" or bare hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub download_size: u64,
    #[serde(default)]
    pub installed_size: u64,
}

impl DownloadInfo {
    /// Declared file type, or the one implied by the URL when undeclared
    pub fn kind(&self) -> FileType {
        match self.file_type {
            FileType::Undefined => FileType::from_url(&self.url),
            declared => declared,
        }
    }

    /// File name of the download, taken from the last URL path segment
    pub fn file_name(&self) -> String {
        self.url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eula {
    pub url: String,
    pub label: String,
    #[serde(default)]
    pub message: String,
}

/// An installable add-on. Sub-modules are dependencies installed together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub pre_selected: bool,
    /// Install location, may reference `{UNITY_PATH}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eulas: Vec<Eula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_modules: Vec<Module>,
    #[serde(flatten)]
    pub info: DownloadInfo,
}

impl Module {
    pub fn new(id: impl Into<String>, info: DownloadInfo) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: String::new(),
            required: false,
            hidden: false,
            pre_selected: false,
            destination: None,
            eulas: Vec::new(),
            parent_module_id: None,
            sub_modules: Vec::new(),
            info,
        }
    }

    /// Visit this module and all nested sub-modules, depth first
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Module)) {
        visit(self);
        for sub in &self.sub_modules {
            sub.walk(visit);
        }
    }
}

/// Root download of a release for one platform/architecture pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorDownload {
    pub platform: Platform,
    pub architecture: Architecture,
    #[serde(flatten)]
    pub info: DownloadInfo,
    /// Top-level modules only, nested modules live in `sub_modules`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<Module>,
}

impl EditorDownload {
    /// Flattened view over every module of the tree
    pub fn all_modules(&self) -> Vec<&Module> {
        let mut modules = Vec::new();
        for module in &self.modules {
            module.walk(&mut |m| modules.push(m));
        }
        modules
    }
}

/// A package to transfer and install: the editor or one of its modules
#[derive(Debug, Clone, PartialEq)]
pub enum Download {
    Editor(EditorDownload),
    Module(Module),
}

impl Download {
    pub fn id(&self) -> &str {
        match self {
            Download::Editor(_) => EDITOR_PACKAGE_ID,
            Download::Module(module) => &module.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Download::Editor(_) => "Unity Editor",
            Download::Module(module) => &module.title,
        }
    }

    pub fn info(&self) -> &DownloadInfo {
        match self {
            Download::Editor(editor) => &editor.info,
            Download::Module(module) => &module.info,
        }
    }

    pub fn is_editor(&self) -> bool {
        matches!(self, Download::Editor(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamFlags {
    #[serde(default)]
    pub alpha: bool,
    #[serde(default)]
    pub beta: bool,
    #[serde(default)]
    pub tech: bool,
    #[serde(default)]
    pub lts: bool,
}

impl StreamFlags {
    fn merge(&mut self, other: StreamFlags) {
        self.alpha |= other.alpha;
        self.beta |= other.beta;
        self.tech |= other.tech;
        self.lts |= other.lts;
    }
}

/// One published editor version with its per-platform download trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: VersionIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub stream: StreamFlags,
    #[serde(default)]
    pub downloads: Vec<EditorDownload>,
}

impl Release {
    #[allow(dead_code)]
    pub fn new(version: VersionIdentity) -> Self {
        Self {
            version,
            release_date: None,
            stream: StreamFlags::default(),
            downloads: Vec::new(),
        }
    }

    pub fn download_for(&self, platform: Platform, architecture: Architecture) -> Option<&EditorDownload> {
        self.downloads
            .iter()
            .find(|d| d.platform == platform && d.architecture == architecture)
    }

    /// Merge another record of the same release into this one.
    /// Downloads are overwritten per (platform, architecture), other keys are kept.
    pub fn merge(&mut self, incoming: Release) {
        for download in incoming.downloads {
            match self
                .downloads
                .iter_mut()
                .find(|d| d.platform == download.platform && d.architecture == download.architecture)
            {
                Some(existing) => *existing = download,
                None => self.downloads.push(download),
            }
        }
        if incoming.release_date.is_some() {
            self.release_date = incoming.release_date;
        }
        self.stream.merge(incoming.stream);
        if self.version.hash.is_none() {
            self.version.hash = incoming.version.hash;
        }
    }
}
