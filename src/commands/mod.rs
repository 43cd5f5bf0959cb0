// Command implementations and the lookups they share

pub mod config;
pub mod details;
pub mod install;
pub mod installs;
pub mod list;
pub mod relocate;
pub mod uninstall;
pub mod update;

use crate::catalog::{Architecture, Catalog, Platform, Release};
use crate::cli::TargetArgs;
use crate::config::{self as settings, Configuration};
use crate::error::ResolveError;
use crate::install::{ArchiveInstaller, Installation, PlatformInstaller};
use crate::version::VersionIdentity;
use anyhow::Context;
use log::debug;

/// Parse a version argument, rejecting input that is neither a version nor a hash
pub(crate) fn parse_version(input: &str) -> Result<VersionIdentity, ResolveError> {
    let version = VersionIdentity::parse(input);
    if !version.is_valid() {
        return Err(ResolveError::InvalidVersion(input.to_string()));
    }
    Ok(version)
}

pub(crate) fn load_catalog() -> anyhow::Result<Catalog> {
    let path = settings::catalog_path();
    debug!("Loading catalog from {}", path.display());
    Catalog::load(&path)
}

/// Newest catalog release matching a version argument
pub(crate) fn find_release(catalog: &Catalog, input: &str) -> anyhow::Result<Release> {
    let version = parse_version(input)?;
    let release = catalog
        .find(&version)
        .ok_or_else(|| ResolveError::UnknownVersion(input.to_string()))?;
    Ok(release)
}

pub(crate) fn resolve_target(target: &TargetArgs) -> anyhow::Result<(Platform, Architecture)> {
    let platform = match &target.platform {
        Some(name) => Platform::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}', expected mac, windows or linux", name))?,
        None => Platform::current(),
    };
    let architecture = match &target.architecture {
        Some(name) => Architecture::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown architecture '{}', expected x64 or arm64", name))?,
        None => Architecture::current(),
    };
    Ok((platform, architecture))
}

pub(crate) fn installer(config: &Configuration) -> ArchiveInstaller {
    ArchiveInstaller::new(config.install_root()).with_scan_depth(config.install_scan_depth())
}

/// Installation whose version matches the argument, exactly or as a fuzzy filter
pub(crate) async fn find_installation(
    platform: &dyn PlatformInstaller,
    input: &str,
) -> anyhow::Result<Installation> {
    let version = parse_version(input)?;
    let installations = platform
        .find_installations()
        .await
        .context("Failed to scan installations")?;

    let mut matches: Vec<Installation> = installations
        .into_iter()
        .filter(|i| {
            if version.is_full() {
                i.version == version
            } else {
                version.fuzzy_matches(&i.version)
            }
        })
        .collect();
    matches.sort_by(|a, b| b.version.compare(&a.version));

    match matches.len() {
        0 => anyhow::bail!("No installation of Unity {} found", input),
        1 => Ok(matches.remove(0)),
        _ => anyhow::bail!(
            "'{}' matches {} installations, be more specific: {}",
            input,
            matches.len(),
            matches
                .iter()
                .map(|i| i.version.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
