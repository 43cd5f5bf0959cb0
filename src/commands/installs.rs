// Installs command for listing editor installations

use crate::commands::installer;
use crate::config::Configuration;
use crate::install::PlatformInstaller;
use crate::ui;

pub async fn installs() -> anyhow::Result<i32> {
    let config = Configuration::load()?;
    let platform = installer(&config);
    let installations = platform.find_installations().await?;

    if installations.is_empty() {
        ui::dim(&format!("No installations in {}", config.install_root().display()));
        return Ok(0);
    }

    for installation in &installations {
        ui::line(&format!(
            "{:<24} {}",
            installation.version.short(),
            installation.path.display()
        ));
        if !installation.modules.is_empty() {
            ui::dim(&format!("  {}", installation.modules.join(", ")));
        }
    }
    Ok(0)
}
