//! Settings passed explicitly to every compile and staging call.
//!
//! Loadable from a TOML file:
//!
//! ```toml
//! enum_serialization = "text"
//! command_timeout_secs = 30
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::fragment::TemporaryTableRequest;
use crate::native::NativeCommand;

/// How enumerated values are stored in columns and bound as parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum EnumSerialization {
    /// The variant's discriminant, in an integer column.
    #[default]
    #[serde(rename = "integers")]
    AsIntegers,
    /// The variant's symbol, in a text column.
    #[serde(rename = "text")]
    AsText,
}

/// Callback invoked right before a prepared command executes.
pub type Interceptor = Arc<dyn Fn(&mut NativeCommand, &[TemporaryTableRequest]) + Send + Sync>;

#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub enum_serialization: EnumSerialization,
    /// Applied to commands that do not carry their own timeout.
    pub command_timeout_secs: Option<u64>,
    #[serde(skip)]
    pub interceptor: Option<Interceptor>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("enum_serialization", &self.enum_serialization)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("interceptor", &self.interceptor.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Settings {
    pub fn with_enum_serialization(mut self, policy: EnumSerialization) -> Self {
        self.enum_serialization = policy;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_interceptor(
        mut self,
        interceptor: impl Fn(&mut NativeCommand, &[TemporaryTableRequest]) + Send + Sync + 'static,
    ) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// `<config_dir>/sqlstitch/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlstitch").join("config.toml"))
    }

    /// Load the default file if it exists, otherwise return defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }
}
