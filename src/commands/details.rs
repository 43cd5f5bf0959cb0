// Details command for showing the packages of a release

use crate::catalog::{EDITOR_PACKAGE_ID, Module, plugins, resolver};
use crate::cli::TargetArgs;
use crate::commands::{find_release, load_catalog, resolve_target};
use crate::ui;

pub fn details(version: &str, target: &TargetArgs) -> anyhow::Result<i32> {
    let catalog = load_catalog()?;
    let release = find_release(&catalog, version)?;
    let (platform, architecture) = resolve_target(target)?;
    let editor = resolver::editor_with_plugins(&release, platform, architecture, &plugins::builtin())?;

    ui::header(&format!("Unity {} ({} {})", release.version, platform, architecture));
    if let Some(date) = release.release_date {
        ui::dim(&format!("Released {}", date));
    }

    ui::line(&row(EDITOR_PACKAGE_ID, "Editor", 0, editor.info.download_size, editor.info.installed_size, true));
    for module in &editor.modules {
        print_module(module, 1);
    }
    ui::dim("* selected by default");

    Ok(0)
}

fn print_module(module: &Module, depth: usize) {
    if module.hidden {
        return;
    }
    ui::line(&row(
        &module.id,
        &module.title,
        depth,
        module.info.download_size,
        module.info.installed_size,
        module.pre_selected,
    ));
    for sub in &module.sub_modules {
        print_module(sub, depth + 1);
    }
}

fn row(id: &str, title: &str, depth: usize, download: u64, installed: u64, selected: bool) -> String {
    let marker = if selected { "*" } else { " " };
    let name = format!("{}{}", "  ".repeat(depth), id);
    format!(
        "{} {:<36} {:<32} {:>10} {:>10}",
        marker,
        name,
        title,
        ui::format_bytes(download),
        ui::format_bytes(installed)
    )
}
