// List command for showing known releases grouped by major.minor

use crate::commands::{load_catalog, parse_version};
use crate::ui;
use crate::version::ReleaseType;

pub fn list(release_type: &str, filter: Option<&str>) -> anyhow::Result<i32> {
    let min_type = ReleaseType::from_name(release_type)
        .filter(|t| t.is_defined())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown release type '{}', expected final, patch, beta or alpha",
                release_type
            )
        })?;
    let filter = filter.map(parse_version).transpose()?;

    let catalog = load_catalog()?;
    if catalog.is_empty() {
        ui::warning("The catalog is empty, run 'install-unity update --source <feed>' first");
        return Ok(2);
    }

    let releases: Vec<_> = catalog
        .releases_of(min_type)
        .into_iter()
        .filter(|r| filter.as_ref().is_none_or(|f| f.fuzzy_matches(&r.version)))
        .collect();
    if releases.is_empty() {
        ui::warning("No releases match");
        return Ok(2);
    }

    // Releases are sorted newest first, so groups are contiguous
    let mut group = String::new();
    let mut versions: Vec<String> = Vec::new();
    for release in releases {
        let key = release.version.major_minor();
        if key != group {
            flush_group(&group, &mut versions);
            group = key;
        }
        versions.push(release.version.short());
    }
    flush_group(&group, &mut versions);

    Ok(0)
}

fn flush_group(group: &str, versions: &mut Vec<String>) {
    if versions.is_empty() {
        return;
    }
    ui::header(group);
    ui::line(&format!("  {}", versions.join("  ")));
    versions.clear();
}
