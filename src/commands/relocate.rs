// Move command for relocating an editor installation

use crate::commands::{find_installation, installer};
use crate::config::Configuration;
use crate::install::PlatformInstaller;
use crate::ui;
use std::path::PathBuf;

pub async fn relocate(version: &str, path: &str) -> anyhow::Result<i32> {
    let config = Configuration::load()?;
    let platform = installer(&config);
    let installation = find_installation(&platform, version).await?;

    let target = PathBuf::from(path);
    if target == installation.path {
        ui::dim(&format!("Unity {} is already at {}", installation.version, path));
        return Ok(2);
    }

    let moved = platform.move_installation(&installation, &target).await?;
    ui::success(&format!(
        "Moved Unity {} to {}",
        moved.version,
        moved.path.display()
    ));
    Ok(0)
}
