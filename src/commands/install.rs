// Install command for downloading and installing a release with its packages

use crate::catalog::{PackageSelection, plugins, resolver};
use crate::cli::TargetArgs;
use crate::commands::{find_release, installer, load_catalog, resolve_target};
use crate::config::Configuration;
use crate::download::http;
use crate::error::ResolveError;
use crate::install::{
    ExistingFileStrategy, InstallSteps, PlatformInstaller, Queue, Scheduler, SchedulerOptions,
};
use crate::ui;
use anyhow::Context;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct InstallOptions {
    pub version: String,
    pub packages: Vec<String>,
    pub all_packages: bool,
    pub download_only: bool,
    pub install_only: bool,
    pub existing: ExistingFileStrategy,
    pub keep: bool,
    pub target: TargetArgs,
    pub dry_run: bool,
}

impl InstallOptions {
    fn steps(&self) -> InstallSteps {
        if self.download_only {
            InstallSteps::DownloadOnly
        } else if self.install_only {
            InstallSteps::InstallOnly
        } else {
            InstallSteps::DownloadAndInstall
        }
    }
}

pub async fn install(options: InstallOptions) -> anyhow::Result<i32> {
    let config = Configuration::load()?;
    let catalog = load_catalog()?;
    let release = find_release(&catalog, &options.version)?;
    let (platform, architecture) = resolve_target(&options.target)?;
    let plugins = plugins::builtin();

    let patterns = if !options.packages.is_empty() {
        options.packages.clone()
    } else if !options.all_packages && !config.default_packages.is_empty() {
        config.default_packages.clone()
    } else {
        let editor = resolver::editor_with_plugins(&release, platform, architecture, &plugins)?;
        resolver::default_selection(&editor, options.all_packages)
    };
    debug!("Resolving packages {:?}", patterns);

    let mut not_found = Vec::new();
    let selection = resolver::resolve_packages(
        &release,
        platform,
        architecture,
        &patterns,
        &plugins,
        &mut not_found,
    )?;
    if !not_found.is_empty() {
        return Err(ResolveError::UnknownPackages {
            version: release.version.to_string(),
            packages: not_found,
        }
        .into());
    }
    if selection.is_empty() {
        ui::warning("Nothing to install");
        return Ok(2);
    }

    let steps = options.steps();
    let download_dir = config.download_dir_for(&release.version);
    print_plan(&release.version.to_string(), steps, &selection);

    let mut queue = Queue::new(release, platform, architecture, download_dir.clone(), selection);
    ui::dim(&format!(
        "Download size {}, installed size {}",
        ui::format_bytes(queue.total_download_size()),
        ui::format_bytes(queue.total_installed_size())
    ));

    if options.dry_run {
        ui::status("[DRY RUN]", &format!("Would use {}", download_dir.display()));
        if steps.installs() {
            let target = config.install_path_for(&queue.context.release.version);
            ui::status("[DRY RUN]", &format!("Would install to {}", target.display()));
        }
        return Ok(0);
    }

    let platform_installer: Arc<dyn PlatformInstaller> = Arc::new(installer(&config));
    let client = http::transfer_client(config.request_timeout())?;
    let progress = Arc::new(ui::QueueProgress::new());
    let scheduler = Scheduler::new(platform_installer, client, SchedulerOptions::from(&config))
        .with_observer(progress.clone());

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
                cancel.cancel();
            }
        })
    };

    let result = scheduler
        .process(
            steps,
            &mut queue,
            options.existing,
            &config.install_path_template(),
            &cancel,
        )
        .await;
    interrupt.abort();

    let installation = match result {
        Ok(installation) => installation,
        Err(err) => {
            progress.clear();
            return Err(err).context(format!("Unity {} was not installed", queue.context.release.version));
        }
    };

    match installation {
        Some(installation) => ui::success(&format!(
            "Installed Unity {} at {}",
            installation.version,
            installation.path.display()
        )),
        None => ui::success(&format!(
            "Downloaded {} package(s) to {}",
            queue.items.len(),
            download_dir.display()
        )),
    }

    if steps == InstallSteps::DownloadAndInstall && !options.keep {
        clean_up(&queue);
    }
    Ok(0)
}

fn print_plan(version: &str, steps: InstallSteps, selection: &[PackageSelection]) {
    let verb = match steps {
        InstallSteps::DownloadOnly => "Downloading",
        InstallSteps::InstallOnly | InstallSteps::DownloadAndInstall => "Installing",
    };
    ui::header(&format!("{} Unity {}", verb, version));
    for selected in selection {
        let suffix = if selected.auto_added { " (dependency)" } else { "" };
        let title = selected.download.title();
        let name = if title.is_empty() { selected.download.id() } else { title };
        ui::action(&format!(
            "{} {}{}",
            name,
            ui::format_bytes(selected.download.info().download_size),
            suffix
        ));
    }
}

/// Remove downloaded package files and the version's download directory if it ends up empty
fn clean_up(queue: &Queue) {
    for item in &queue.items {
        if item.file_path.exists() {
            if let Err(e) = std::fs::remove_file(&item.file_path) {
                warn!("Could not remove {}: {}", item.file_path.display(), e);
            }
        }
    }
    let dir = &queue.context.download_dir;
    let empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if empty {
        if let Err(e) = std::fs::remove_dir(dir) {
            warn!("Could not remove {}: {}", dir.display(), e);
        }
    }
}
