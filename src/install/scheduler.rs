// Scheduler: drives a queue through download and install with bounded concurrency

use crate::config::Configuration;
use crate::download::{DownloadState, Downloader, DownloaderOptions, TransferProgress};
use crate::error::{DownloadError, QueueError};
use crate::install::platform::{Installation, PlatformInstaller};
use crate::install::queue::{ItemState, Queue, QueueItem};
use log::{debug, info, warn};
use reqwest::Client;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which phases a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSteps {
    DownloadOnly,
    InstallOnly,
    DownloadAndInstall,
}

impl InstallSteps {
    pub fn downloads(self) -> bool {
        self != InstallSteps::InstallOnly
    }

    pub fn installs(self) -> bool {
        self != InstallSteps::DownloadOnly
    }
}

/// What to do with a package file that already exists in the download directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFileStrategy {
    /// Trust any file of the expected size without hashing it
    Skip,
    /// Verify complete files by hash, download partial or mismatching files again
    Hash,
    /// Verify complete files by hash, continue partial files
    #[default]
    Resume,
    /// Delete the file and download it again
    Redownload,
}

impl FromStr for ExistingFileStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(ExistingFileStrategy::Skip),
            "hash" => Ok(ExistingFileStrategy::Hash),
            "resume" => Ok(ExistingFileStrategy::Resume),
            "redownload" => Ok(ExistingFileStrategy::Redownload),
            _ => Err(format!(
                "unknown strategy '{}', expected skip, hash, resume or redownload",
                s
            )),
        }
    }
}

impl fmt::Display for ExistingFileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExistingFileStrategy::Skip => "skip",
            ExistingFileStrategy::Hash => "hash",
            ExistingFileStrategy::Resume => "resume",
            ExistingFileStrategy::Redownload => "redownload",
        })
    }
}

/// Receives queue events. State changes and retries are reported from the
/// scheduler loop, transfer progress from the running transfers.
pub trait QueueObserver: Send + Sync {
    fn state_changed(&self, _item: &QueueItem, _previous: ItemState) {}

    /// Called from the transfer task after every chunk
    fn transfer(&self, _id: &str, _progress: &TransferProgress) {}

    /// A failed transfer was scheduled again, the reason is in the status text
    fn retrying(&self, _item: &QueueItem) {}
}

/// Observer that ignores every event
pub struct SilentObserver;

impl QueueObserver for SilentObserver {}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub max_concurrent_downloads: usize,
    pub max_concurrent_installs: usize,
    /// Download attempts per package
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub downloader: DownloaderOptions,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

impl From<&Configuration> for SchedulerOptions {
    fn from(config: &Configuration) -> Self {
        Self {
            max_concurrent_downloads: config.max_concurrent_downloads.max(1),
            max_concurrent_installs: config.max_concurrent_installs.max(1),
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
            poll_interval: config.poll_interval(),
            downloader: DownloaderOptions::from(config),
        }
    }
}

pub struct Scheduler {
    platform: Arc<dyn PlatformInstaller>,
    client: Client,
    options: SchedulerOptions,
    observer: Arc<dyn QueueObserver>,
}

impl Scheduler {
    pub fn new(platform: Arc<dyn PlatformInstaller>, client: Client, options: SchedulerOptions) -> Self {
        Self {
            platform,
            client,
            options,
            observer: Arc::new(SilentObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the queue to completion.
    ///
    /// Returns the resulting installation when installing, `None` for download-only runs.
    /// On any unrecovered fault or cancellation the install pipeline is rolled back and
    /// the original error is returned.
    pub async fn process(
        &self,
        steps: InstallSteps,
        queue: &mut Queue,
        strategy: ExistingFileStrategy,
        path_template: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Installation>, QueueError> {
        self.check_files(steps, queue)?;
        self.prepare_items(steps, queue, strategy)?;

        if steps.installs() {
            self.platform
                .prepare_install(queue, path_template)
                .await
                .map_err(QueueError::Prepare)?;
        }

        let token = cancel.child_token();
        match self.run(steps, queue, &token).await {
            Ok(()) => {
                if !steps.installs() {
                    return Ok(None);
                }
                self.platform
                    .complete_install(false)
                    .await
                    .map_err(QueueError::Complete)
            }
            Err(err) => {
                warn!("Aborting queue: {}", err);
                token.cancel();
                self.stop_tasks(queue).await;
                if steps.installs() {
                    if let Err(rollback) = self.platform.complete_install(true).await {
                        warn!("Rollback failed: {}", rollback);
                    }
                }
                Err(err)
            }
        }
    }

    /// Install-only runs need every package file before anything is touched
    fn check_files(&self, steps: InstallSteps, queue: &Queue) -> Result<(), QueueError> {
        if steps.downloads() {
            return Ok(());
        }
        for item in &queue.items {
            if !item.file_path.is_file() {
                return Err(QueueError::MissingFile {
                    id: item.id().to_string(),
                    path: item.file_path.clone(),
                });
            }
        }
        Ok(())
    }

    fn prepare_items(
        &self,
        steps: InstallSteps,
        queue: &mut Queue,
        strategy: ExistingFileStrategy,
    ) -> Result<(), QueueError> {
        let after_download = if steps.installs() {
            ItemState::WaitingForInstall
        } else {
            ItemState::Complete
        };

        for item in &mut queue.items {
            item.retries_remaining = self.options.retry_count.max(1);
            item.retry_not_before = None;

            if !steps.downloads() {
                self.set_state(item, ItemState::WaitingForInstall);
                continue;
            }

            let info = item.package.info().clone();
            let existing = std::fs::metadata(&item.file_path).ok().map(|m| m.len());
            let mut options = self.options.downloader.clone();

            match (strategy, existing) {
                // Without a known size a leftover file cannot be told apart from a truncated one
                (ExistingFileStrategy::Skip, Some(size))
                    if info.download_size > 0 && size >= info.download_size =>
                {
                    if info.integrity.is_none() {
                        warn!("Cannot verify existing '{}', no hash available", item.file_path.display());
                    }
                    debug!("Using existing file for '{}'", item.id());
                    self.set_state(item, after_download);
                    continue;
                }
                (ExistingFileStrategy::Hash, Some(size)) if size < info.download_size => {
                    remove_file(&item.file_path)?;
                }
                (ExistingFileStrategy::Redownload, Some(_)) => {
                    remove_file(&item.file_path)?;
                }
                _ => {}
            }
            if strategy == ExistingFileStrategy::Redownload {
                options.resume = false;
            } else if strategy != ExistingFileStrategy::Skip {
                options.resume = true;
            }

            let mut downloader = Downloader::new(self.client.clone(), options);
            let observer = self.observer.clone();
            let id = item.id().to_string();
            downloader.set_progress_callback(Arc::new(move |progress: &TransferProgress| {
                observer.transfer(&id, progress)
            }));
            downloader
                .prepare(
                    &info.url,
                    &item.file_path,
                    info.download_size,
                    info.integrity.as_deref(),
                )
                .map_err(|source| QueueError::Download {
                    id: item.id().to_string(),
                    source,
                })?;
            item.progress = Some(downloader.progress());
            item.downloader = Some(downloader);
            self.set_state(item, ItemState::WaitingForDownload);
        }
        Ok(())
    }

    async fn run(
        &self,
        steps: InstallSteps,
        queue: &mut Queue,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            self.collect_finished(steps, queue).await?;
            if queue.is_complete() {
                info!("Queue complete");
                return Ok(());
            }
            self.start_work(queue, cancel)?;

            for item in &mut queue.items {
                if item.download_task.is_some() {
                    self.sync_download_state(item);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
    }

    /// Move finished transfers and installs to their next state
    async fn collect_finished(&self, steps: InstallSteps, queue: &mut Queue) -> Result<(), QueueError> {
        let after_download = if steps.installs() {
            ItemState::WaitingForInstall
        } else {
            ItemState::Complete
        };

        for item in &mut queue.items {
            if item.download_task.as_ref().is_some_and(|t| t.is_finished()) {
                let Some(task) = item.download_task.take() else {
                    continue;
                };
                let (downloader, result) = task.await.map_err(|e| QueueError::Task {
                    id: item.id().to_string(),
                    message: e.to_string(),
                })?;
                let resumed = downloader.resumed();
                item.downloader = Some(downloader);

                match result {
                    Ok(()) => {
                        debug!("Download of '{}' finished (resumed: {})", item.id(), resumed);
                        self.set_state(item, after_download);
                    }
                    Err(DownloadError::Cancelled) => return Err(QueueError::Cancelled),
                    Err(err) => self.handle_download_failure(item, err)?,
                }
            }

            if item.install_task.as_ref().is_some_and(|t| t.is_finished()) {
                let Some(task) = item.install_task.take() else {
                    continue;
                };
                let result = task.await.map_err(|e| QueueError::Task {
                    id: item.id().to_string(),
                    message: e.to_string(),
                })?;
                match result {
                    Ok(()) => {
                        debug!("Install of '{}' finished", item.id());
                        self.set_state(item, ItemState::Complete);
                    }
                    Err(source) => {
                        return Err(QueueError::Install {
                            id: item.id().to_string(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_download_failure(&self, item: &mut QueueItem, err: DownloadError) -> Result<(), QueueError> {
        item.retries_remaining = item.retries_remaining.saturating_sub(1);
        if !err.is_retryable() || item.retries_remaining == 0 {
            return Err(QueueError::Download {
                id: item.id().to_string(),
                source: err,
            });
        }

        warn!(
            "Download of '{}' failed, {} attempt(s) left: {}",
            item.id(),
            item.retries_remaining,
            err
        );
        if let Some(downloader) = item.downloader.as_mut() {
            downloader.reset();
        }
        item.retry_not_before = Some(Instant::now() + self.options.retry_delay);
        self.set_state(item, ItemState::WaitingForDownload);
        item.set_status(format!(
            "retrying in {}s: {}",
            self.options.retry_delay.as_secs(),
            err
        ));
        self.observer.retrying(item);
        Ok(())
    }

    /// Start downloads and installs while under the concurrency caps
    fn start_work(&self, queue: &mut Queue, cancel: &CancellationToken) -> Result<(), QueueError> {
        let mut downloading = queue.items.iter().filter(|i| i.download_task.is_some()).count();
        let mut installing = queue.items.iter().filter(|i| i.install_task.is_some()).count();
        // Accessory packages install into the editor, which has to be in place first
        let editor_ready = queue
            .items
            .iter()
            .filter(|i| i.is_editor())
            .all(|i| i.state == ItemState::Complete);
        let now = Instant::now();
        let context = queue.context.clone();

        for item in &mut queue.items {
            match item.state {
                ItemState::WaitingForDownload
                    if downloading < self.options.max_concurrent_downloads
                        && item.retry_not_before.is_none_or(|t| now >= t) =>
                {
                    let Some(mut downloader) = item.downloader.take() else {
                        return Err(QueueError::Task {
                            id: item.id().to_string(),
                            message: "no downloader prepared".to_string(),
                        });
                    };
                    item.retry_not_before = None;
                    item.progress = Some(downloader.progress());
                    let token = cancel.clone();
                    item.download_task = Some(tokio::spawn(async move {
                        let result = downloader.start(&token).await;
                        (downloader, result)
                    }));
                    downloading += 1;
                    self.set_state(item, ItemState::Hashing);
                }
                ItemState::WaitingForInstall
                    if installing < self.options.max_concurrent_installs
                        && (item.is_editor() || editor_ready) =>
                {
                    let platform = self.platform.clone();
                    let context = context.clone();
                    let package = item.package.clone();
                    let file_path = item.file_path.clone();
                    item.install_task = Some(tokio::spawn(async move {
                        platform.install(context, package, file_path).await
                    }));
                    installing += 1;
                    self.set_state(item, ItemState::Installing);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn sync_download_state(&self, item: &mut QueueItem) {
        let Some(progress) = item.progress.as_ref() else {
            return;
        };
        let state = match progress.state() {
            DownloadState::Hashing => ItemState::Hashing,
            DownloadState::Downloading => ItemState::Downloading,
            _ => return,
        };
        if item.state != state {
            self.set_state(item, state);
        }
    }

    /// Stop transfers and wait for running installs before rolling back
    async fn stop_tasks(&self, queue: &mut Queue) {
        for item in &mut queue.items {
            if let Some(task) = item.download_task.take() {
                task.abort();
                let _ = task.await;
            }
            if let Some(task) = item.install_task.take() {
                if let Ok(Err(err)) = task.await {
                    debug!("Install of '{}' failed during abort: {}", item.id(), err);
                }
            }
        }
    }

    fn set_state(&self, item: &mut QueueItem, state: ItemState) {
        let previous = item.state;
        item.state = state;
        item.set_status(state.to_string());
        if previous != state {
            debug!("'{}': {} -> {}", item.id(), previous, state);
            self.observer.state_changed(item, previous);
        }
    }
}

fn remove_file(path: &std::path::Path) -> Result<(), QueueError> {
    std::fs::remove_file(path).map_err(|source| QueueError::Io {
        path: path.to_path_buf(),
        source,
    })
}
