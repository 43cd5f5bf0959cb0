// Download module: HTTP transport, integrity hashing and the resumable downloader

pub mod downloader;
pub mod hash;
pub mod http;

pub use downloader::{DownloadState, Downloader, DownloaderOptions, TransferProgress};
