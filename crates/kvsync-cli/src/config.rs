use std::fs;
use std::path::{Path, PathBuf};

use kvsync::StoreConfig;
use serde::Deserialize;
use tracing::debug;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "kvsync.toml";

/// Contents of `kvsync.toml`.
///
/// ```toml
/// db = "app.db"
///
/// [store]
/// name = "prefs"
/// version = 2
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub db: Option<PathBuf>,
    pub store: StoreConfig,
}

impl CliConfig {
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load the config file, then apply command-line overrides.
    pub fn resolve(
        explicit: Option<&Path>,
        db: Option<PathBuf>,
        store: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if db.is_some() {
            config.db = db;
        }
        if let Some(name) = store {
            config.store.name = name;
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        debug!(path = %path.display(), "reading config");
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::parse(&text).map_err(|e| format!("invalid {}: {e}", path.display()).into())
    }
}
