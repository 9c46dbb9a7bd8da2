use serde::Deserialize;

/// Store name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "kvsync";

/// Prefix of the bus channel carrying a store's sync events.
pub const CHANNEL_PREFIX: &str = "kvsync:";

/// Configuration for a [`Store`](crate::Store).
///
/// Migrations are code, so they are registered on the
/// [`StoreBuilder`](crate::StoreBuilder) rather than here.
///
/// ```
/// use kvsync::StoreConfig;
///
/// let config = StoreConfig::from_toml_str("name = \"prefs\"\nversion = 2").unwrap();
/// assert_eq!(config.name, "prefs");
/// assert_eq!(config.version, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Identity of the persisted store. Instances with the same name share
    /// records and synchronize; different names are isolated.
    pub name: String,
    /// Schema version this instance reads and writes. 0 means unversioned.
    pub version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_string(),
            version: 0,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML table, filling missing fields with defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// The bus channel for this store.
    pub fn channel(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.name)
    }
}
