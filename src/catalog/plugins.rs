// Module plugins: inject modules that upstream metadata does not publish

use crate::catalog::model::{Architecture, DownloadInfo, FileType, Module, Platform, Release};
use crate::version::{ReleaseType, VersionIdentity};

/// A pure function returning extra modules for a release on a platform.
/// Plugins are passed explicitly to the resolver, there is no global registry.
pub type ModulePlugin = fn(&Release, Platform, Architecture) -> Vec<Module>;

/// Plugins enabled by default
pub fn builtin() -> Vec<ModulePlugin> {
    vec![language_packs]
}

const LANGUAGES: &[(&str, &str)] = &[
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh-hans", "Chinese (Simplified)"),
    ("zh-hant", "Chinese (Traditional)"),
];

/// Editor language packs, published as `.po` files next to the editor download
/// for releases since 2018.1.
pub fn language_packs(release: &Release, platform: Platform, architecture: Architecture) -> Vec<Module> {
    let first_supported = VersionIdentity::new(2018, 1, 0, ReleaseType::Alpha, 0);
    if release.version.compare(&first_supported).is_lt() {
        return Vec::new();
    }

    let Some(editor) = release.download_for(platform, architecture) else {
        return Vec::new();
    };
    let Some(base_url) = editor.info.url.rfind('/').map(|i| &editor.info.url[..=i]) else {
        return Vec::new();
    };

    let destination = match platform {
        Platform::Mac => "{UNITY_PATH}/Unity.app/Contents/Localization",
        Platform::Windows | Platform::Linux => "{UNITY_PATH}/Editor/Data/Localization",
    };

    LANGUAGES
        .iter()
        .map(|(code, name)| {
            let url = format!("{}LanguagePack/{}.po", base_url, code);
            let mut module = Module::new(
                format!("language-{}", code),
                DownloadInfo {
                    url,
                    integrity: None,
                    file_type: FileType::Po,
                    download_size: 0,
                    installed_size: 0,
                },
            );
            module.title = format!("{} Language Pack", name);
            module.description = format!("{} translation of the editor", name);
            module.destination = Some(destination.to_string());
            module
        })
        .collect()
}
