// Package resolution: turn user package patterns into a dependency-closed package list

use crate::catalog::model::{
    Architecture, Download, EDITOR_PACKAGE_ID, EditorDownload, Module, Platform, Release,
};
use crate::catalog::plugins::ModulePlugin;
use crate::error::ResolveError;
use log::debug;

/// Prefix selecting a module by unique substring of its id
pub const FUZZY_PREFIX: char = '~';
/// Prefix disabling automatic selection of a module's sub-modules
pub const NO_DEPENDENCIES_PREFIX: char = '=';

/// A package chosen for the queue
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSelection {
    pub download: Download,
    /// Pulled in as a dependency rather than requested by the user
    pub auto_added: bool,
}

/// Editor download for the platform with plugin-provided modules merged in
pub fn editor_with_plugins(
    release: &Release,
    platform: Platform,
    architecture: Architecture,
    plugins: &[ModulePlugin],
) -> Result<EditorDownload, ResolveError> {
    let mut editor = release
        .download_for(platform, architecture)
        .cloned()
        .ok_or_else(|| ResolveError::NoDownload {
            version: release.version.to_string(),
            platform,
            architecture,
        })?;

    for plugin in plugins {
        for module in plugin(release, platform, architecture) {
            let exists = editor
                .all_modules()
                .iter()
                .any(|m| m.id.eq_ignore_ascii_case(&module.id));
            if exists {
                continue;
            }
            debug!("Plugin adds module '{}' to {}", module.id, release.version);
            editor.modules.push(module);
        }
    }

    Ok(editor)
}

/// Package ids selected when the user gives no patterns: the editor plus the
/// pre-selected modules, or every visible module when `all_packages` is set.
pub fn default_selection(editor: &EditorDownload, all_packages: bool) -> Vec<String> {
    let mut ids = vec![EDITOR_PACKAGE_ID.to_string()];
    ids.extend(
        editor
            .modules
            .iter()
            .filter(|m| if all_packages { !m.hidden } else { m.pre_selected })
            .map(|m| m.id.clone()),
    );
    ids
}

/// Resolve package patterns against a release.
///
/// Patterns are case-insensitive module ids, optionally prefixed with `~` (unique
/// substring match) and/or `=` (do not add sub-modules). Patterns that match nothing
/// are appended to `not_found`; the caller decides whether that is fatal.
pub fn resolve_packages(
    release: &Release,
    platform: Platform,
    architecture: Architecture,
    patterns: &[String],
    plugins: &[ModulePlugin],
    not_found: &mut Vec<String>,
) -> Result<Vec<PackageSelection>, ResolveError> {
    let editor = editor_with_plugins(release, platform, architecture, plugins)?;
    let modules = editor.all_modules();
    let mut selected: Vec<PackageSelection> = Vec::new();

    for pattern in patterns {
        let mut id = pattern.trim();
        let mut fuzzy = false;
        let mut add_dependencies = true;
        loop {
            if let Some(rest) = id.strip_prefix(FUZZY_PREFIX) {
                fuzzy = true;
                id = rest;
            } else if let Some(rest) = id.strip_prefix(NO_DEPENDENCIES_PREFIX) {
                add_dependencies = false;
                id = rest;
            } else {
                break;
            }
        }

        if id.is_empty() {
            not_found.push(pattern.clone());
            continue;
        }

        let resolved = if fuzzy {
            find_fuzzy(id, &modules, pattern)?
        } else if id.eq_ignore_ascii_case(EDITOR_PACKAGE_ID) {
            Some(Resolved::Editor)
        } else {
            modules
                .iter()
                .find(|m| m.id.eq_ignore_ascii_case(id))
                .map(|m| Resolved::Module(m))
        };

        match resolved {
            Some(Resolved::Editor) => {
                if !contains(&selected, EDITOR_PACKAGE_ID) {
                    selected.push(PackageSelection {
                        download: Download::Editor(editor.clone()),
                        auto_added: false,
                    });
                }
            }
            Some(Resolved::Module(module)) => {
                add_module(&mut selected, module, false, add_dependencies);
            }
            None => not_found.push(pattern.clone()),
        }
    }

    // The editor is always processed first
    if let Some(position) = selected.iter().position(|s| s.download.is_editor()) {
        let editor_selection = selected.remove(position);
        selected.insert(0, editor_selection);
    }

    Ok(selected)
}

enum Resolved<'a> {
    Editor,
    Module(&'a Module),
}

fn find_fuzzy<'a>(
    needle: &str,
    modules: &[&'a Module],
    pattern: &str,
) -> Result<Option<Resolved<'a>>, ResolveError> {
    let needle = needle.to_lowercase();
    let mut candidates: Vec<(&str, Resolved<'a>)> = Vec::new();

    if EDITOR_PACKAGE_ID.to_lowercase().contains(&needle) {
        candidates.push((EDITOR_PACKAGE_ID, Resolved::Editor));
    }
    for module in modules {
        if module.id.to_lowercase().contains(&needle) {
            candidates.push((&module.id, Resolved::Module(module)));
        }
    }

    if candidates.len() > 1 {
        return Err(ResolveError::AmbiguousPackage {
            pattern: pattern.to_string(),
            first: candidates[0].0.to_string(),
            second: candidates[1].0.to_string(),
        });
    }

    Ok(candidates.pop().map(|(_, resolved)| resolved))
}

fn contains(selected: &[PackageSelection], id: &str) -> bool {
    selected
        .iter()
        .any(|s| s.download.id().eq_ignore_ascii_case(id))
}

fn add_module(
    selected: &mut Vec<PackageSelection>,
    module: &Module,
    auto_added: bool,
    add_dependencies: bool,
) {
    if !contains(selected, &module.id) {
        selected.push(PackageSelection {
            download: Download::Module(module.clone()),
            auto_added,
        });
    }

    if add_dependencies {
        for sub in &module.sub_modules {
            add_module(selected, sub, true, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{DownloadInfo, FileType};
    use crate::version::VersionIdentity;

    fn info(url: &str) -> DownloadInfo {
        DownloadInfo {
            url: url.to_string(),
            integrity: None,
            file_type: FileType::from_url(url),
            download_size: 100,
            installed_size: 200,
        }
    }

    fn module(id: &str) -> Module {
        Module::new(id, info(&format!("https://example.com/{}.zip", id)))
    }

    // android -> android-sdk -> android-ndk, plus ios, webgl (pre-selected), hidden docs
    fn sample_release() -> Release {
        let mut ndk = module("android-ndk");
        ndk.parent_module_id = Some("android-sdk".into());
        let mut sdk = module("android-sdk");
        sdk.parent_module_id = Some("android".into());
        sdk.sub_modules.push(ndk);
        let mut android = module("android");
        android.sub_modules.push(sdk);

        let mut webgl = module("webgl");
        webgl.pre_selected = true;
        let mut docs = module("documentation");
        docs.hidden = true;

        let mut release = Release::new(VersionIdentity::parse("2021.3.0f1"));
        release.downloads.push(EditorDownload {
            platform: Platform::Mac,
            architecture: Architecture::X64,
            info: info("https://example.com/Unity.zip"),
            modules: vec![android, module("ios"), webgl, docs],
        });
        release
    }

    fn resolve(patterns: &[&str]) -> (Result<Vec<PackageSelection>, ResolveError>, Vec<String>) {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let mut not_found = Vec::new();
        let result = resolve_packages(
            &sample_release(),
            Platform::Mac,
            Architecture::X64,
            &patterns,
            &[],
            &mut not_found,
        );
        (result, not_found)
    }

    fn ids(selection: &[PackageSelection]) -> Vec<&str> {
        selection.iter().map(|s| s.download.id()).collect()
    }

    #[test]
    fn test_dependency_closure() {
        let (result, not_found) = resolve(&["android"]);
        let selection = result.unwrap();
        assert!(not_found.is_empty());
        assert_eq!(ids(&selection), vec!["android", "android-sdk", "android-ndk"]);
        assert!(!selection[0].auto_added);
        assert!(selection[1].auto_added);
        assert!(selection[2].auto_added);
    }

    #[test]
    fn test_dependency_not_duplicated_when_requested() {
        let (result, _) = resolve(&["android", "android-ndk", "ANDROID-SDK"]);
        let selection = result.unwrap();
        assert_eq!(ids(&selection), vec!["android", "android-sdk", "android-ndk"]);
        assert!(selection[1].auto_added);
        assert!(selection[2].auto_added);
    }

    #[test]
    fn test_no_dependencies_prefix() {
        let (result, _) = resolve(&["=android"]);
        assert_eq!(ids(&result.unwrap()), vec!["android"]);
    }

    #[test]
    fn test_editor_is_first_and_case_insensitive() {
        let (result, _) = resolve(&["ios", "unity"]);
        let selection = result.unwrap();
        assert_eq!(ids(&selection), vec![EDITOR_PACKAGE_ID, "ios"]);
        assert!(selection[0].download.is_editor());
    }

    #[test]
    fn test_fuzzy_unique_match() {
        let (result, _) = resolve(&["~ndk"]);
        assert_eq!(ids(&result.unwrap()), vec!["android-ndk"]);

        let (result, _) = resolve(&["~=sdk"]);
        assert_eq!(ids(&result.unwrap()), vec!["android-sdk"]);
    }

    #[test]
    fn test_fuzzy_ambiguous_is_error() {
        let (result, _) = resolve(&["~android"]);
        match result {
            Err(ResolveError::AmbiguousPackage { first, second, .. }) => {
                assert_eq!(first, "android");
                assert_eq!(second, "android-sdk");
            }
            other => panic!("expected ambiguous error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_patterns_reported() {
        let (result, not_found) = resolve(&["ios", "switch", "~zzz"]);
        assert_eq!(ids(&result.unwrap()), vec!["ios"]);
        assert_eq!(not_found, vec!["switch".to_string(), "~zzz".to_string()]);
    }

    #[test]
    fn test_missing_platform_is_error() {
        let mut not_found = Vec::new();
        let result = resolve_packages(
            &sample_release(),
            Platform::Windows,
            Architecture::X64,
            &["unity".to_string()],
            &[],
            &mut not_found,
        );
        assert!(matches!(result, Err(ResolveError::NoDownload { .. })));
    }

    #[test]
    fn test_default_selection() {
        let release = sample_release();
        let editor = release
            .download_for(Platform::Mac, Architecture::X64)
            .unwrap();
        assert_eq!(default_selection(editor, false), vec!["Unity", "webgl"]);
        assert_eq!(
            default_selection(editor, true),
            vec!["Unity", "android", "ios", "webgl"]
        );
    }

    #[test]
    fn test_plugin_modules_resolve() {
        fn extra(_: &Release, _: Platform, _: Architecture) -> Vec<Module> {
            vec![module("language-ja"), module("ios")]
        }
        let mut not_found = Vec::new();
        let selection = resolve_packages(
            &sample_release(),
            Platform::Mac,
            Architecture::X64,
            &["language-ja".to_string()],
            &[extra],
            &mut not_found,
        )
        .unwrap();
        assert_eq!(ids(&selection), vec!["language-ja"]);

        let editor =
            editor_with_plugins(&sample_release(), Platform::Mac, Architecture::X64, &[extra])
                .unwrap();
        let ios_count = editor.all_modules().iter().filter(|m| m.id == "ios").count();
        assert_eq!(ios_count, 1);
    }
}
