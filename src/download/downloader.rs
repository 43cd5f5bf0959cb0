// Downloader: one resumable, hash-verified file transfer with throughput metrics

use crate::config::Configuration;
use crate::download::hash::{Hasher, IntegrityHash, hash_file_into};
use crate::error::DownloadError;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, header};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Hashing,
    Downloading,
    Complete,
}

impl DownloadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DownloadState::Hashing,
            2 => DownloadState::Downloading,
            3 => DownloadState::Complete,
            _ => DownloadState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DownloadState::Idle => 0,
            DownloadState::Hashing => 1,
            DownloadState::Downloading => 2,
            DownloadState::Complete => 3,
        }
    }
}

/// Live metrics of a transfer, shared with observers while the download task runs
#[derive(Debug, Default)]
pub struct TransferProgress {
    state: AtomicU8,
    bytes_processed: AtomicU64,
    bytes_total: AtomicU64,
    bytes_per_second: AtomicU64,
}

impl TransferProgress {
    pub fn state(&self) -> DownloadState {
        DownloadState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Expected size in bytes, 0 when unknown
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: DownloadState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    fn set_processed(&self, bytes: u64) {
        self.bytes_processed.store(bytes, Ordering::Relaxed);
    }

    fn set_total(&self, bytes: u64) {
        self.bytes_total.store(bytes, Ordering::Relaxed);
    }

    fn set_speed(&self, bytes_per_second: u64) {
        self.bytes_per_second.store(bytes_per_second, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.set_state(DownloadState::Idle);
        self.set_processed(0);
        self.set_total(0);
        self.set_speed(0);
    }
}

pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Sliding window of `(elapsed_ms, chunk_size)` samples
#[derive(Debug)]
pub struct ThroughputWindow {
    capacity: usize,
    samples: VecDeque<(u64, u64)>,
    bytes_in_window: u64,
}

impl ThroughputWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            samples: VecDeque::new(),
            bytes_in_window: 0,
        }
    }

    pub fn push(&mut self, elapsed_ms: u64, size: u64) {
        self.samples.push_back((elapsed_ms, size));
        self.bytes_in_window += size;
        while self.samples.len() > self.capacity {
            if let Some((_, oldest)) = self.samples.pop_front() {
                self.bytes_in_window -= oldest;
            }
        }
    }

    /// Bytes per second over the window, `None` until the window spans some time
    pub fn bytes_per_second(&self) -> Option<u64> {
        let (first, _) = self.samples.front()?;
        let (last, _) = self.samples.back()?;
        let duration_ms = last.saturating_sub(*first);
        if duration_ms == 0 {
            return None;
        }
        Some(self.bytes_in_window * 1000 / duration_ms)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.bytes_in_window = 0;
    }
}

#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    pub resume: bool,
    pub chunk_size: usize,
    pub throughput_window: usize,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self::from(&Configuration::default())
    }
}

impl From<&Configuration> for DownloaderOptions {
    fn from(config: &Configuration) -> Self {
        Self {
            resume: config.resume_downloads,
            chunk_size: config.chunk_size,
            throughput_window: config.throughput_window,
        }
    }
}

#[derive(Debug, Clone)]
struct PreparedTransfer {
    url: String,
    path: PathBuf,
    expected_size: u64,
    expected_hash: Option<IntegrityHash>,
}

/// A single transfer. `prepare` then `start` once; `reset` allows another `start`.
pub struct Downloader {
    client: Client,
    options: DownloaderOptions,
    transfer: Option<PreparedTransfer>,
    started: bool,
    resumed: bool,
    progress: Arc<TransferProgress>,
    on_progress: Option<ProgressCallback>,
    window: ThroughputWindow,
}

impl Downloader {
    pub fn new(client: Client, options: DownloaderOptions) -> Self {
        let window = ThroughputWindow::new(options.throughput_window);
        Self {
            client,
            options,
            transfer: None,
            started: false,
            resumed: false,
            progress: Arc::new(TransferProgress::default()),
            on_progress: None,
            window,
        }
    }

    /// Store transfer parameters. Nothing touches the network or the disk yet.
    pub fn prepare(
        &mut self,
        url: &str,
        path: &Path,
        expected_size: u64,
        expected_hash: Option<&str>,
    ) -> Result<(), DownloadError> {
        let expected_hash = expected_hash
            .filter(|h| !h.trim().is_empty())
            .map(IntegrityHash::parse)
            .transpose()?;
        self.transfer = Some(PreparedTransfer {
            url: url.to_string(),
            path: path.to_path_buf(),
            expected_size,
            expected_hash,
        });
        self.reset();
        Ok(())
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.on_progress = Some(callback);
    }

    pub fn progress(&self) -> Arc<TransferProgress> {
        self.progress.clone()
    }

    /// Whether the last transfer continued a partial file
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Return to `Idle` so `start` can run again
    pub fn reset(&mut self) {
        self.started = false;
        self.resumed = false;
        self.window.clear();
        self.progress.clear();
    }

    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<(), DownloadError> {
        if self.started {
            return Err(DownloadError::AlreadyStarted);
        }
        let transfer = self.transfer.clone().ok_or(DownloadError::NotPrepared)?;
        self.started = true;
        self.progress.set_total(transfer.expected_size);

        let mut offset = 0u64;
        if let Ok(metadata) = tokio::fs::metadata(&transfer.path).await {
            let existing = metadata.len();
            if !self.options.resume {
                debug!("Resume disabled, replacing {}", transfer.path.display());
            } else if existing >= transfer.expected_size && existing > 0 {
                match &transfer.expected_hash {
                    Some(expected) => {
                        let actual = self.hash_existing(&transfer.path, expected, cancel).await?;
                        if expected.matches(&actual) {
                            info!("Existing file {} verified", transfer.path.display());
                            self.complete();
                            return Ok(());
                        }
                        warn!(
                            "Existing file {} does not match {}, downloading again",
                            transfer.path.display(),
                            expected
                        );
                    }
                    None if transfer.expected_size == 0 => {
                        debug!(
                            "Neither size nor hash known for {}, downloading again",
                            transfer.path.display()
                        );
                    }
                    None => {
                        warn!(
                            "No hash to verify existing file {}, assuming it is complete",
                            transfer.path.display()
                        );
                        self.complete();
                        return Ok(());
                    }
                }
            } else if existing < transfer.expected_size {
                offset = existing;
            }
        }

        self.download(&transfer, offset, cancel).await
    }

    async fn download(
        &mut self,
        transfer: &PreparedTransfer,
        mut offset: u64,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        self.progress.set_state(DownloadState::Downloading);

        let mut request = self.client.get(&transfer.url);
        if offset > 0 {
            debug!("Requesting {} from byte {}", transfer.url, offset);
            request = request.header(header::RANGE, format!("bytes={}-", offset));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = request.send() => response.map_err(|source| DownloadError::Request {
                url: transfer.url.clone(),
                source,
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: transfer.url.clone(),
                status: status.as_u16(),
            });
        }
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            info!("Server ignored the range request, downloading {} from the start", transfer.url);
            offset = 0;
        }
        self.resumed = offset > 0;

        if transfer.expected_size == 0 {
            if let Some(length) = response.content_length() {
                self.progress.set_total(offset + length);
            }
        }

        let mut hasher = transfer.expected_hash.as_ref().map(|h| Hasher::new(h.algorithm));
        if let Some(parent) = transfer.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let mut file = if self.resumed {
            if let Some(hasher) = hasher.as_mut() {
                self.progress.set_state(DownloadState::Hashing);
                let progress = self.progress.clone();
                let callback = self.on_progress.clone();
                hash_file_into(&transfer.path, hasher, self.options.chunk_size, |n| {
                    progress.set_processed(n);
                    if let Some(callback) = &callback {
                        callback(&progress);
                    }
                })
                .await?;
                self.progress.set_state(DownloadState::Downloading);
            }
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&transfer.path)
                .await
                .map_err(|e| DownloadError::io(&transfer.path, e))?
        } else {
            tokio::fs::File::create(&transfer.path)
                .await
                .map_err(|e| DownloadError::io(&transfer.path, e))?
        };

        let mut processed = offset;
        self.progress.set_processed(processed);

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut reader = StreamReader::new(stream);
        let mut buffer = vec![0u8; self.options.chunk_size.max(1)];
        let started = Instant::now();

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = file.flush().await;
                    return Err(DownloadError::Cancelled);
                }
                read = read_chunk(&mut reader, &mut buffer) => read.map_err(|source| {
                    DownloadError::Transfer {
                        url: transfer.url.clone(),
                        source,
                    }
                })?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read])
                .await
                .map_err(|e| DownloadError::io(&transfer.path, e))?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buffer[..read]);
            }
            processed += read as u64;
            self.progress.set_processed(processed);

            self.window
                .push(started.elapsed().as_millis() as u64, read as u64);
            if let Some(speed) = self.window.bytes_per_second() {
                self.progress.set_speed(speed);
            }
            if let Some(callback) = &self.on_progress {
                callback(&self.progress);
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io(&transfer.path, e))?;
        drop(file);

        if transfer.expected_size > 0 && processed < transfer.expected_size {
            return Err(DownloadError::Incomplete {
                expected: transfer.expected_size,
                received: processed,
            });
        }

        if let (Some(expected), Some(hasher)) = (&transfer.expected_hash, hasher) {
            let actual = hasher.finalize();
            if !expected.matches(&actual) {
                if self.resumed {
                    // The partial file cannot be trusted, the next attempt starts over
                    discard_partial(&transfer.path).await?;
                }
                return Err(DownloadError::HashMismatch {
                    path: transfer.path.clone(),
                    expected: expected.to_string(),
                    actual: format!("{}:{}", expected.algorithm.prefix(), actual),
                    resumed: self.resumed,
                });
            }
        }

        debug!("Downloaded {} ({} bytes)", transfer.url, processed);
        self.complete();
        Ok(())
    }

    async fn hash_existing(
        &self,
        path: &Path,
        expected: &IntegrityHash,
        cancel: &CancellationToken,
    ) -> Result<String, DownloadError> {
        self.progress.set_state(DownloadState::Hashing);
        let mut hasher = Hasher::new(expected.algorithm);
        let progress = self.progress.clone();
        let callback = self.on_progress.clone();
        let hashing = hash_file_into(path, &mut hasher, self.options.chunk_size, |n| {
            progress.set_processed(n);
            if let Some(callback) = &callback {
                callback(&progress);
            }
        });
        tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            result = hashing => { result?; }
        }
        Ok(hasher.finalize())
    }

    fn complete(&mut self) {
        self.progress.set_state(DownloadState::Complete);
        if let Some(callback) = &self.on_progress {
            callback(&self.progress);
        }
    }
}

/// Delete a file that failed verification. A file that cannot be removed would be
/// resumed again on every retry, so the failure is reported instead.
async fn discard_partial(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!("Could not discard {}: {}", path.display(), e);
            Err(DownloadError::io(path, e))
        }
    }
}

/// Fill `buffer` unless the stream ends first, returning the bytes read
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
