// Uninstall command for removing an editor installation

use crate::commands::{find_installation, installer};
use crate::config::Configuration;
use crate::install::PlatformInstaller;
use crate::ui;

pub async fn uninstall(version: &str) -> anyhow::Result<i32> {
    let config = Configuration::load()?;
    let platform = installer(&config);
    let installation = find_installation(&platform, version).await?;

    let pb = ui::spinner(&format!("Removing Unity {}", installation.version));
    match platform.uninstall(&installation).await {
        Ok(()) => {
            ui::finish_spinner_success(
                &pb,
                &format!("Removed Unity {} from {}", installation.version, installation.path.display()),
            );
            Ok(0)
        }
        Err(e) => {
            ui::finish_spinner_error(&pb, &format!("Could not remove Unity {}", installation.version));
            Err(e.into())
        }
    }
}
