// Platform installer trait: the collaborator that puts packages on disk

use crate::catalog::Download;
use crate::error::InstallError;
use crate::install::queue::{Queue, QueueContext};
use crate::version::VersionIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An editor installation found on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub version: VersionIdentity,
    pub path: PathBuf,
    #[serde(default)]
    pub modules: Vec<String>,
}

/// Installs packages for one platform.
///
/// Only one install pipeline may be active at a time: `prepare_install` opens it,
/// `complete_install` closes it, either committing or rolling back.
#[async_trait::async_trait]
pub trait PlatformInstaller: Send + Sync {
    async fn find_installations(&self) -> Result<Vec<Installation>, InstallError>;

    /// Open the pipeline for a queue. `path_template` is the installation path template.
    async fn prepare_install(&self, queue: &Queue, path_template: &str) -> Result<(), InstallError>;

    /// Install one downloaded package into the open pipeline
    async fn install(
        &self,
        context: Arc<QueueContext>,
        package: Download,
        file_path: PathBuf,
    ) -> Result<(), InstallError>;

    /// Close the pipeline. With `aborted` set, partial install state is rolled back
    /// and no installation is returned.
    async fn complete_install(&self, aborted: bool) -> Result<Option<Installation>, InstallError>;

    async fn uninstall(&self, installation: &Installation) -> Result<(), InstallError>;

    async fn move_installation(
        &self,
        installation: &Installation,
        new_path: &Path,
    ) -> Result<Installation, InstallError>;
}
