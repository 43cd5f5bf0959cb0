// Queue: the packages of one install run and their per-item state

use crate::catalog::{Architecture, Download, PackageSelection, Platform, Release};
use crate::download::{Downloader, TransferProgress};
use crate::error::{DownloadError, InstallError};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    WaitingForDownload,
    Hashing,
    Downloading,
    WaitingForInstall,
    Installing,
    Complete,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemState::WaitingForDownload => "waiting for download",
            ItemState::Hashing => "verifying",
            ItemState::Downloading => "downloading",
            ItemState::WaitingForInstall => "waiting for install",
            ItemState::Installing => "installing",
            ItemState::Complete => "complete",
        })
    }
}

/// Immutable facts shared by every item of a queue
#[derive(Debug, Clone)]
pub struct QueueContext {
    pub release: Release,
    #[allow(dead_code)]
    pub platform: Platform,
    #[allow(dead_code)]
    pub architecture: Architecture,
    pub download_dir: PathBuf,
}

pub(crate) type DownloadTask = JoinHandle<(Downloader, Result<(), DownloadError>)>;
pub(crate) type InstallTask = JoinHandle<Result<(), InstallError>>;

pub struct QueueItem {
    pub package: Download,
    /// Selected as a dependency of another package
    #[allow(dead_code)]
    pub auto_added: bool,
    pub file_path: PathBuf,
    pub state: ItemState,
    pub retries_remaining: u32,
    pub(crate) retry_not_before: Option<Instant>,
    pub(crate) downloader: Option<Downloader>,
    pub(crate) progress: Option<Arc<TransferProgress>>,
    pub(crate) download_task: Option<DownloadTask>,
    pub(crate) install_task: Option<InstallTask>,
    status_text: String,
}

impl QueueItem {
    fn new(selection: PackageSelection, file_path: PathBuf) -> Self {
        Self {
            package: selection.download,
            auto_added: selection.auto_added,
            file_path,
            state: ItemState::WaitingForDownload,
            retries_remaining: 0,
            retry_not_before: None,
            downloader: None,
            progress: None,
            download_task: None,
            install_task: None,
            status_text: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.package.id()
    }

    pub fn is_editor(&self) -> bool {
        self.package.is_editor()
    }

    /// Last status message, e.g. the reason for a pending retry
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub(crate) fn set_status(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.download_task.is_some() || self.install_task.is_some()
    }
}

pub struct Queue {
    pub context: Arc<QueueContext>,
    pub items: Vec<QueueItem>,
}

impl Queue {
    /// Build a queue downloading every selected package into `download_dir`
    pub fn new(
        release: Release,
        platform: Platform,
        architecture: Architecture,
        download_dir: PathBuf,
        selection: Vec<PackageSelection>,
    ) -> Self {
        let mut used_names = HashSet::new();
        let items = selection
            .into_iter()
            .map(|selected| {
                let mut name = selected.download.info().file_name();
                if !used_names.insert(name.to_lowercase()) {
                    name = format!("{}-{}", selected.download.id(), name);
                    used_names.insert(name.to_lowercase());
                }
                let path = download_dir.join(name);
                QueueItem::new(selected, path)
            })
            .collect();

        Self {
            context: Arc::new(QueueContext {
                release,
                platform,
                architecture,
                download_dir,
            }),
            items,
        }
    }

    pub fn has_editor(&self) -> bool {
        self.items.iter().any(QueueItem::is_editor)
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|i| i.state == ItemState::Complete)
    }

    pub fn total_download_size(&self) -> u64 {
        self.items.iter().map(|i| i.package.info().download_size).sum()
    }

    pub fn total_installed_size(&self) -> u64 {
        self.items.iter().map(|i| i.package.info().installed_size).sum()
    }
}
