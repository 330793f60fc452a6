use anyhow::Result;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{MirrorConfig, smart_load};
use crate::error::SyncError;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Base name of the repository config file, looked up in the working directory
const REPO_CONFIG: &str = "mirrorsync";

const EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

impl MirrorConfig {
    /// Load the layered configuration.
    ///
    /// Priority, lowest first: embedded defaults, user config, repository
    /// config (replaced by `custom_config` when given), `MIRRORSYNC_`
    /// environment variables, then `cli_overrides`.
    pub fn load<T: Serialize>(custom_config: Option<&Path>, cli_overrides: Option<T>) -> Result<Self> {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        for path in existing_variants(&user_config_base_path()) {
            tracing::debug!("Loading user config {}", path.display());
            figment = figment.merge(smart_load::auto(&path));
        }

        match custom_config {
            Some(path) => {
                if !path.is_file() {
                    return Err(SyncError::Configuration(format!("config file {} not found", path.display())).into());
                }
                tracing::debug!("Loading config {}", path.display());
                figment = figment.merge(smart_load::auto(path));
            }
            None => {
                for path in existing_variants(Path::new(REPO_CONFIG)) {
                    tracing::debug!("Loading repository config {}", path.display());
                    figment = figment.merge(smart_load::auto(&path));
                }
            }
        }

        figment = figment.merge(Env::prefixed("MIRRORSYNC_").split("__"));
        if let Some(overrides) = cli_overrides {
            tracing::trace!("CONFIG LOAD: Applying CLI overrides");
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: MirrorConfig =
            figment.extract().map_err(|e| SyncError::Configuration(format!("invalid configuration: {e}")))?;
        tracing::trace!("CONFIG LOAD: {} repositories configured", config.repos.len());
        Ok(config)
    }
}

fn existing_variants(base: &Path) -> Vec<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| base.with_extension(ext))
        .filter(|path| path.is_file())
        .collect()
}

fn user_config_base_path() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".config/mirrorsync/config"),
        Err(_) => PathBuf::from("~/.config/mirrorsync/config"),
    }
}
