//! Read-only settings for the resource pipeline.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Error;

/// Settings consumed at [`crate::manager::ResourceManager`] construction.
///
/// `mount_paths` is ordered: earlier mounts shadow later ones, and a path
/// ending in `.ankizip` mounts as an archive. The rest of the fields are
/// read-only knobs the decoders consult.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSettings {
    pub mount_paths: Vec<PathBuf>,
    /// Scratch directory for derived data; created on startup.
    pub cache_dir: PathBuf,
    pub max_texture_size: u32,
    pub texture_anisotropy: u32,
}

impl Default for ResourceSettings {
    fn default() -> ResourceSettings {
        ResourceSettings {
            mount_paths: Vec::new(),
            cache_dir: PathBuf::from("cache"),
            max_texture_size: 4096,
            texture_anisotropy: 8,
        }
    }
}

impl ResourceSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<ResourceSettings, Error> {
        toml::from_str(text).map_err(|err| Error::Config {
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoketest_toml() {
        let settings = ResourceSettings::from_toml_str(
            r#"
            mount_paths = ["data", "data.ankizip"]
            cache_dir = "/tmp/anki-cache"
            max_texture_size = 1024
            "#,
        )
        .unwrap();

        assert_eq!(settings.mount_paths.len(), 2);
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/anki-cache"));
        assert_eq!(settings.max_texture_size, 1024);
        // Unset fields fall back to defaults.
        assert_eq!(settings.texture_anisotropy, 8);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ResourceSettings::from_toml_str("max_texture_sze = 512").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
