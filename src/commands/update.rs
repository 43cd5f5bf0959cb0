// Update command for merging a release feed into the catalog

use crate::catalog::Release;
use crate::commands::load_catalog;
use crate::config::{self as settings, Configuration};
use crate::download::http;
use crate::ui;
use crate::version::ReleaseType;
use anyhow::Context;
use log::debug;
use std::collections::BTreeSet;

pub async fn update(source: &str, force: bool) -> anyhow::Result<i32> {
    let config = Configuration::load()?;
    let mut catalog = load_catalog()?;

    if !force && !catalog.is_outdated(ReleaseType::Final, config.catalog_max_age()) {
        ui::dim("Catalog is up to date, use --force to update anyway");
        return Ok(2);
    }

    let pb = ui::spinner(&format!("Reading releases from {}", source));
    let releases = match read_feed(source).await {
        Ok(releases) => releases,
        Err(e) => {
            ui::finish_spinner_error(&pb, &format!("Could not read {}", source));
            return Err(e);
        }
    };
    debug!("Feed lists {} release(s)", releases.len());

    let mut types: BTreeSet<ReleaseType> = releases
        .iter()
        .map(|r| r.version.release_type)
        .filter(|t| t.is_defined())
        .collect();
    types.insert(ReleaseType::Final);

    let added = catalog.add_all(releases);
    for release_type in types {
        catalog.mark_updated(release_type);
    }
    catalog.save(&settings::catalog_path())?;

    if added.is_empty() {
        ui::finish_spinner_success(&pb, "No new releases");
    } else {
        ui::finish_spinner_success(&pb, &format!("Added {} new release(s)", added.len()));
        for release in &added {
            ui::action(&release.version.short());
        }
    }
    ui::dim(&format!("The catalog lists {} release(s)", catalog.len()));
    Ok(0)
}

/// Read a JSON array of releases from a local file or an http(s) URL
async fn read_feed(source: &str) -> anyhow::Result<Vec<Release>> {
    if http::is_url(source) {
        return http::fetch_json(source).await;
    }
    let text = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read release feed '{}'", source))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse release feed '{}'", source))
}
