// Archive installer: installs zip packages and plain files through a staging directory

use crate::catalog::{Download, EDITOR_PACKAGE_ID, FileType};
use crate::config::expand_template;
use crate::constants::{INSTALL_MARKER_FILE, UNITY_PATH_PLACEHOLDER};
use crate::error::InstallError;
use crate::install::platform::{Installation, PlatformInstaller};
use crate::install::queue::{Queue, QueueContext};
use crate::version::VersionIdentity;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Contents of the marker file written into each installation
#[derive(Debug, Serialize, Deserialize)]
struct InstallMarker {
    version: VersionIdentity,
    #[serde(default)]
    modules: Vec<String>,
}

#[derive(Debug, Clone)]
struct Pipeline {
    version: VersionIdentity,
    target: PathBuf,
    staging: PathBuf,
    existing_modules: Vec<String>,
    installed: Vec<String>,
}

pub struct ArchiveInstaller {
    install_root: PathBuf,
    scan_depth: usize,
    pipeline: Mutex<Option<Pipeline>>,
}

impl ArchiveInstaller {
    /// `install_root` is scanned by `find_installations`, one level deep by default
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            scan_depth: 1,
            pipeline: Mutex::new(None),
        }
    }

    /// Look for installations up to `depth` directories below the root
    pub fn with_scan_depth(mut self, depth: usize) -> Self {
        self.scan_depth = depth.max(1);
        self
    }

    fn pipeline(&self) -> std::sync::MutexGuard<'_, Option<Pipeline>> {
        // A panic while holding the lock leaves plain data behind, keep using it
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_marker(path: &Path) -> Result<Option<Installation>, InstallError> {
    let marker_path = path.join(INSTALL_MARKER_FILE);
    if !marker_path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&marker_path)
        .map_err(|e| InstallError::io("Failed to read marker", &marker_path, e))?;
    let marker: InstallMarker = toml::from_str(&text).map_err(|e| InstallError::Marker {
        path: marker_path.clone(),
        message: e.to_string(),
    })?;
    Ok(Some(Installation {
        version: marker.version,
        path: path.to_path_buf(),
        modules: marker.modules,
    }))
}

fn write_marker(installation: &Installation) -> Result<(), InstallError> {
    let marker_path = installation.path.join(INSTALL_MARKER_FILE);
    let marker = InstallMarker {
        version: installation.version.clone(),
        modules: installation.modules.clone(),
    };
    let text = toml::to_string_pretty(&marker).map_err(|e| InstallError::Marker {
        path: marker_path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&marker_path, text).map_err(|e| InstallError::io("Failed to write marker", &marker_path, e))
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".staging");
    target.with_file_name(name)
}

/// Resolve where a package goes inside the staging tree
fn package_destination(package: &Download, staging: &Path) -> PathBuf {
    let Download::Module(module) = package else {
        return staging.to_path_buf();
    };
    match module.destination.as_deref() {
        Some(template) => {
            let relative = template
                .strip_prefix(UNITY_PATH_PLACEHOLDER)
                .unwrap_or(template)
                .trim_start_matches(['/', '\\']);
            staging.join(relative)
        }
        None => staging.to_path_buf(),
    }
}

fn extract_zip(id: &str, zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let archive_error = |source| InstallError::Archive {
        id: id.to_string(),
        source,
    };
    let file = fs::File::open(zip_path)
        .map_err(|e| InstallError::io("Failed to open archive", zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_error)?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path in '{}'", id);
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| InstallError::io("Failed to create directory", &out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| InstallError::io("Failed to create directory", parent, e))?;
        }
        let mut outfile = fs::File::create(&out_path)
            .map_err(|e| InstallError::io("Failed to create file", &out_path, e))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| InstallError::io("Failed to extract", &out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted '{}' to {}", id, dest.display());
    Ok(())
}

fn copy_file(file_path: &Path, dest: &Path) -> Result<(), InstallError> {
    fs::create_dir_all(dest).map_err(|e| InstallError::io("Failed to create directory", dest, e))?;
    let name = file_path.file_name().unwrap_or_default();
    let target = dest.join(name);
    fs::copy(file_path, &target).map_err(|e| InstallError::io("Failed to copy", &target, e))?;
    Ok(())
}

/// Move everything from `source` into `target`, replacing files that exist in both
fn merge_dir(source: &Path, target: &Path) -> Result<(), InstallError> {
    fs::create_dir_all(target).map_err(|e| InstallError::io("Failed to create directory", target, e))?;
    let entries = fs::read_dir(source).map_err(|e| InstallError::io("Failed to read", source, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| InstallError::io("Failed to read", source, e))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() && to.is_dir() {
            merge_dir(&from, &to)?;
        } else {
            if to.is_file() {
                fs::remove_file(&to).map_err(|e| InstallError::io("Failed to replace", &to, e))?;
            }
            fs::rename(&from, &to).map_err(|e| InstallError::io("Failed to move", &from, e))?;
        }
    }
    Ok(())
}

fn remove_dir(path: &Path) -> Result<(), InstallError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| InstallError::io("Failed to remove", path, e))?;
    }
    Ok(())
}

/// Collect marked installations below `dir`. A marked directory is not descended into.
fn scan_installations(
    dir: &Path,
    depth: usize,
    installations: &mut Vec<Installation>,
) -> Result<(), InstallError> {
    let entries = fs::read_dir(dir).map_err(|e| InstallError::io("Failed to read", dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match read_marker(&path) {
            Ok(Some(installation)) => installations.push(installation),
            Ok(None) if depth > 1 => {
                if let Err(e) = scan_installations(&path, depth - 1, installations) {
                    warn!("Skipping {}: {}", path.display(), e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring {}: {}", path.display(), e),
        }
    }
    Ok(())
}

/// Move the staging tree into place and record the installed modules
fn commit_pipeline(pipeline: Pipeline) -> Result<Installation, InstallError> {
    if pipeline.target.exists() {
        merge_dir(&pipeline.staging, &pipeline.target)?;
        remove_dir(&pipeline.staging)?;
    } else {
        fs::rename(&pipeline.staging, &pipeline.target)
            .map_err(|e| InstallError::io("Failed to move", &pipeline.staging, e))?;
    }

    let mut modules = pipeline.existing_modules;
    for id in pipeline.installed {
        if EDITOR_PACKAGE_ID.eq_ignore_ascii_case(&id) {
            continue;
        }
        if !modules.iter().any(|m| m.eq_ignore_ascii_case(&id)) {
            modules.push(id);
        }
    }

    let installation = Installation {
        version: pipeline.version,
        path: pipeline.target,
        modules,
    };
    write_marker(&installation)?;
    Ok(installation)
}

#[async_trait::async_trait]
impl PlatformInstaller for ArchiveInstaller {
    async fn find_installations(&self) -> Result<Vec<Installation>, InstallError> {
        let root = self.install_root.clone();
        let depth = self.scan_depth;
        let mut installations = tokio::task::spawn_blocking(move || {
            let mut installations = Vec::new();
            if root.is_dir() {
                scan_installations(&root, depth, &mut installations)?;
            }
            Ok::<_, InstallError>(installations)
        })
        .await
        .map_err(|e| InstallError::Task(e.to_string()))??;

        installations.sort_by(|a, b| b.version.compare(&a.version));
        Ok(installations)
    }

    async fn prepare_install(&self, queue: &Queue, path_template: &str) -> Result<(), InstallError> {
        let mut pipeline = self.pipeline();
        if pipeline.is_some() {
            return Err(InstallError::PipelineBusy);
        }

        let version = queue.context.release.version.clone();
        let target = PathBuf::from(expand_template(path_template, &version));
        let existing = read_marker(&target)?;

        let existing_modules = if queue.has_editor() {
            if let Some(installation) = existing {
                return Err(InstallError::AlreadyInstalled {
                    version: installation.version.to_string(),
                    path: installation.path,
                });
            }
            if target.exists() {
                return Err(InstallError::DestinationExists(target));
            }
            Vec::new()
        } else {
            match existing {
                Some(installation) if installation.version == version => installation.modules,
                _ => return Err(InstallError::NotInstalled(version.to_string())),
            }
        };

        let staging = staging_path(&target);
        remove_dir(&staging)?;
        fs::create_dir_all(&staging)
            .map_err(|e| InstallError::io("Failed to create staging directory", &staging, e))?;

        info!("Installing {} to {}", version, target.display());
        *pipeline = Some(Pipeline {
            version,
            target,
            staging,
            existing_modules,
            installed: Vec::new(),
        });
        Ok(())
    }

    async fn install(
        &self,
        _context: Arc<QueueContext>,
        package: Download,
        file_path: PathBuf,
    ) -> Result<(), InstallError> {
        let staging = self
            .pipeline()
            .as_ref()
            .map(|p| p.staging.clone())
            .ok_or(InstallError::NoPipeline)?;

        let id = package.id().to_string();
        let file_type = package.info().kind();
        let dest = package_destination(&package, &staging);
        debug!("Installing '{}' ({}) into {}", id, file_type, dest.display());

        match file_type {
            FileType::Zip => {
                let task_id = id.clone();
                tokio::task::spawn_blocking(move || extract_zip(&task_id, &file_path, &dest))
                    .await
                    .map_err(|e| InstallError::Failed {
                        id: id.clone(),
                        message: e.to_string(),
                    })??;
            }
            FileType::Po | FileType::Text => copy_file(&file_path, &dest)?,
            FileType::Pkg | FileType::Dmg | FileType::Exe | FileType::Undefined => {
                return Err(InstallError::Unsupported {
                    id,
                    file_type: file_type.to_string(),
                });
            }
        }

        if let Some(pipeline) = self.pipeline().as_mut() {
            pipeline.installed.push(id);
        }
        Ok(())
    }

    async fn complete_install(&self, aborted: bool) -> Result<Option<Installation>, InstallError> {
        let pipeline = self.pipeline().take().ok_or(InstallError::NoPipeline)?;

        if aborted {
            warn!("Rolling back installation of {}", pipeline.version);
            let staging = pipeline.staging;
            tokio::task::spawn_blocking(move || remove_dir(&staging))
                .await
                .map_err(|e| InstallError::Task(e.to_string()))??;
            return Ok(None);
        }

        let installation = tokio::task::spawn_blocking(move || commit_pipeline(pipeline))
            .await
            .map_err(|e| InstallError::Task(e.to_string()))??;
        info!("Installed {} at {}", installation.version, installation.path.display());
        Ok(Some(installation))
    }

    async fn uninstall(&self, installation: &Installation) -> Result<(), InstallError> {
        if read_marker(&installation.path)?.is_none() {
            return Err(InstallError::NotInstalled(installation.version.to_string()));
        }
        remove_dir(&installation.path)?;
        info!("Removed {}", installation.path.display());
        Ok(())
    }

    async fn move_installation(
        &self,
        installation: &Installation,
        new_path: &Path,
    ) -> Result<Installation, InstallError> {
        if new_path.exists() {
            return Err(InstallError::DestinationExists(new_path.to_path_buf()));
        }
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| InstallError::io("Failed to create directory", parent, e))?;
        }
        fs::rename(&installation.path, new_path)
            .map_err(|e| InstallError::io("Failed to move", &installation.path, e))?;

        let mut moved = installation.clone();
        moved.path = new_path.to_path_buf();
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{DownloadInfo, EditorDownload};
    use crate::catalog::{Architecture, Module, PackageSelection, Platform, Release};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::CompressionMethod;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn info(url: &str) -> DownloadInfo {
        DownloadInfo {
            url: url.to_string(),
            integrity: None,
            file_type: FileType::from_url(url),
            download_size: 1,
            installed_size: 1,
        }
    }

    fn editor() -> Download {
        Download::Editor(EditorDownload {
            platform: Platform::Linux,
            architecture: Architecture::X64,
            info: info("https://example.com/Unity.zip"),
            modules: Vec::new(),
        })
    }

    fn module(id: &str, url: &str, destination: Option<&str>) -> Download {
        let mut module = Module::new(id, info(url));
        module.destination = destination.map(String::from);
        Download::Module(module)
    }

    fn queue(packages: Vec<Download>, download_dir: &Path) -> Queue {
        Queue::new(
            Release::new(VersionIdentity::parse("2021.3.0f1")),
            Platform::Linux,
            Architecture::X64,
            download_dir.to_path_buf(),
            packages
                .into_iter()
                .map(|download| PackageSelection {
                    download,
                    auto_added: false,
                })
                .collect(),
        )
    }

    struct Fixture {
        temp_dir: TempDir,
        installer: ArchiveInstaller,
        template: String,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("editors");
        let template = root.join("Unity {version}").to_string_lossy().into_owned();
        Fixture {
            installer: ArchiveInstaller::new(&root),
            temp_dir,
            template,
        }
    }

    async fn install_all(fixture: &Fixture, queue: &Queue) {
        for item in &queue.items {
            fixture
                .installer
                .install(queue.context.clone(), item.package.clone(), item.file_path.clone())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_install_editor_and_modules() {
        let fixture = fixture();
        let downloads = fixture.temp_dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();

        let queue = queue(
            vec![
                editor(),
                module(
                    "linux-il2cpp",
                    "https://example.com/il2cpp.zip",
                    Some("{UNITY_PATH}/Editor/Data/PlaybackEngines"),
                ),
                module(
                    "language-ja",
                    "https://example.com/ja.po",
                    Some("{UNITY_PATH}/Editor/Data/Localization"),
                ),
            ],
            &downloads,
        );
        write_zip(&queue.items[0].file_path, &[("Editor/Unity", b"editor")]);
        write_zip(&queue.items[1].file_path, &[("LinuxStandalone/il2cpp", b"il2cpp")]);
        fs::write(&queue.items[2].file_path, b"msgid \"\"").unwrap();

        fixture
            .installer
            .prepare_install(&queue, &fixture.template)
            .await
            .unwrap();
        install_all(&fixture, &queue).await;
        let installation = fixture
            .installer
            .complete_install(false)
            .await
            .unwrap()
            .unwrap();

        let path = &installation.path;
        assert!(path.ends_with("Unity 2021.3.0f1"));
        assert_eq!(fs::read(path.join("Editor/Unity")).unwrap(), b"editor");
        assert!(
            path.join("Editor/Data/PlaybackEngines/LinuxStandalone/il2cpp")
                .is_file()
        );
        assert!(path.join("Editor/Data/Localization/ja.po").is_file());
        assert_eq!(installation.modules, vec!["linux-il2cpp", "language-ja"]);
        assert!(!staging_path(path).exists());

        let found = fixture.installer.find_installations().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], installation);
    }

    #[tokio::test]
    async fn test_find_installations_below_nested_template() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("unity");
        let template = root
            .join("{major}.{minor}")
            .join("Unity {version}")
            .to_string_lossy()
            .into_owned();
        let installer = ArchiveInstaller::new(&root).with_scan_depth(2);
        let downloads = temp_dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let queue = queue(vec![editor()], &downloads);
        write_zip(&queue.items[0].file_path, &[("Editor/Unity", b"editor")]);

        installer.prepare_install(&queue, &template).await.unwrap();
        installer
            .install(queue.context.clone(), queue.items[0].package.clone(), queue.items[0].file_path.clone())
            .await
            .unwrap();
        let installation = installer.complete_install(false).await.unwrap().unwrap();
        assert_eq!(installation.path, root.join("2021.3").join("Unity 2021.3.0f1"));

        // a flat installation next to the nested ones is still found
        let flat = root.join("Unity 2020.3.1f1");
        fs::create_dir_all(&flat).unwrap();
        write_marker(&Installation {
            version: VersionIdentity::parse("2020.3.1f1"),
            path: flat.clone(),
            modules: Vec::new(),
        })
        .unwrap();

        let found = installer.find_installations().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], installation);
        assert_eq!(found[1].path, flat);

        let shallow = ArchiveInstaller::new(&root);
        assert_eq!(shallow.find_installations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_removes_staging() {
        let fixture = fixture();
        let downloads = fixture.temp_dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let queue = queue(vec![editor()], &downloads);
        write_zip(&queue.items[0].file_path, &[("Editor/Unity", b"editor")]);

        fixture
            .installer
            .prepare_install(&queue, &fixture.template)
            .await
            .unwrap();
        install_all(&fixture, &queue).await;
        let result = fixture.installer.complete_install(true).await.unwrap();

        assert!(result.is_none());
        let target = PathBuf::from(expand_template(&fixture.template, &queue.context.release.version));
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
        assert!(fixture.installer.find_installations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_is_single_flight() {
        let fixture = fixture();
        let downloads = fixture.temp_dir.path().join("downloads");
        let queue = queue(vec![editor()], &downloads);

        fixture
            .installer
            .prepare_install(&queue, &fixture.template)
            .await
            .unwrap();
        assert!(matches!(
            fixture.installer.prepare_install(&queue, &fixture.template).await,
            Err(InstallError::PipelineBusy)
        ));
        fixture.installer.complete_install(true).await.unwrap();
        assert!(matches!(
            fixture.installer.complete_install(true).await,
            Err(InstallError::NoPipeline)
        ));
    }

    #[tokio::test]
    async fn test_modules_require_existing_installation() {
        let fixture = fixture();
        let downloads = fixture.temp_dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let modules_only = queue(
            vec![module("doc", "https://example.com/doc.zip", None)],
            &downloads,
        );
        assert!(matches!(
            fixture
                .installer
                .prepare_install(&modules_only, &fixture.template)
                .await,
            Err(InstallError::NotInstalled(_))
        ));

        // install the editor, then add the module to it
        let editor_queue = queue(vec![editor()], &downloads);
        write_zip(&editor_queue.items[0].file_path, &[("Editor/Unity", b"editor")]);
        fixture
            .installer
            .prepare_install(&editor_queue, &fixture.template)
            .await
            .unwrap();
        install_all(&fixture, &editor_queue).await;
        fixture.installer.complete_install(false).await.unwrap();

        write_zip(&modules_only.items[0].file_path, &[("Docs/index.html", b"docs")]);
        fixture
            .installer
            .prepare_install(&modules_only, &fixture.template)
            .await
            .unwrap();
        install_all(&fixture, &modules_only).await;
        let installation = fixture
            .installer
            .complete_install(false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(installation.modules, vec!["doc"]);
        assert!(installation.path.join("Editor/Unity").is_file());
        assert!(installation.path.join("Docs/index.html").is_file());

        // editor again is rejected
        assert!(matches!(
            fixture
                .installer
                .prepare_install(&editor_queue, &fixture.template)
                .await,
            Err(InstallError::AlreadyInstalled { .. })
        ));
    }

    #[tokio::test]
    async fn test_native_installers_unsupported() {
        let fixture = fixture();
        let downloads = fixture.temp_dir.path().join("downloads");
        let queue = queue(vec![module("ios", "https://example.com/ios.pkg", None)], &downloads);
        fs::create_dir_all(fixture.temp_dir.path().join("editors/Unity 2021.3.0f1")).unwrap();
        write_marker(&Installation {
            version: VersionIdentity::parse("2021.3.0f1"),
            path: fixture.temp_dir.path().join("editors/Unity 2021.3.0f1"),
            modules: Vec::new(),
        })
        .unwrap();

        fixture
            .installer
            .prepare_install(&queue, &fixture.template)
            .await
            .unwrap();
        let result = fixture
            .installer
            .install(queue.context.clone(), queue.items[0].package.clone(), queue.items[0].file_path.clone())
            .await;
        assert!(matches!(result, Err(InstallError::Unsupported { .. })));
    }

    #[test]
    fn test_extract_zip_skips_unsafe_paths() {
        let temp_dir = TempDir::new().unwrap();
        let zip_path = temp_dir.path().join("unsafe.zip");
        let extract_dir = temp_dir.path().join("extract");
        write_zip(&zip_path, &[("../outside.txt", b"nope"), ("inside.txt", b"ok")]);

        extract_zip("unsafe", &zip_path, &extract_dir).unwrap();

        assert!(!temp_dir.path().join("outside.txt").exists());
        assert!(extract_dir.join("inside.txt").is_file());
    }

    #[tokio::test]
    async fn test_move_and_uninstall() {
        let fixture = fixture();
        let old_path = fixture.temp_dir.path().join("editors/Unity 2020.3.1f1");
        fs::create_dir_all(&old_path).unwrap();
        let installation = Installation {
            version: VersionIdentity::parse("2020.3.1f1"),
            path: old_path.clone(),
            modules: vec!["ios".into()],
        };
        write_marker(&installation).unwrap();

        let new_path = fixture.temp_dir.path().join("elsewhere/Unity 2020");
        let moved = fixture
            .installer
            .move_installation(&installation, &new_path)
            .await
            .unwrap();
        assert_eq!(moved.path, new_path);
        assert!(!old_path.exists());
        assert_eq!(read_marker(&new_path).unwrap().unwrap().modules, vec!["ios"]);

        fixture.installer.uninstall(&moved).await.unwrap();
        assert!(!new_path.exists());
        assert!(fixture.installer.uninstall(&moved).await.is_err());
    }
}
