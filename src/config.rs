//! Cache configuration — generation naming, pre-load list, and interception
//! rules.
//!
//! Configuration can be built in code with the builder methods, or loaded
//! from a JSON file whose keys are camelCase:
//!
//! ```json
//! {
//!   "generationName": "app-cache-v3",
//!   "precacheList": ["/", "/manifest.json"],
//!   "bypassPrefixes": ["/api/", "/login", "/ws"],
//!   "cacheableExtensions": [".css", ".js"],
//!   "cacheableContentTypes": ["text/css", "image/"]
//! }
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the cache needs to know about one deployment.
///
/// The generation name is the eviction lever: bump it on deploy, and the
/// next activation retires every entry cached under the old name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Name of the store generation this deployment reads and writes.
    pub generation_name: String,
    /// Targets fetched and stored during install.
    pub precache_list: Vec<String>,
    /// Path prefixes the cache must never touch.
    pub bypass_prefixes: Vec<String>,
    /// Path suffixes whose responses are stored on success.
    pub cacheable_extensions: Vec<String>,
    /// `Content-Type` prefixes whose responses are stored on success, for
    /// asset paths that carry no extension.
    pub cacheable_content_types: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation_name: "app-cache-v1".to_owned(),
            precache_list: vec!["/".to_owned()],
            bypass_prefixes: vec!["/api/".to_owned(), "/login".to_owned(), "/ws".to_owned()],
            cacheable_extensions: [
                ".css", ".js", ".mjs", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
                ".webp", ".woff", ".woff2",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            cacheable_content_types: [
                "text/css",
                "application/javascript",
                "text/javascript",
                "image/",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        }
    }
}

impl CacheConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file cannot be read,
    /// [`ConfigError::Parse`] when its contents are not valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Sets the generation name.
    #[must_use]
    pub fn generation(mut self, name: impl Into<String>) -> Self {
        self.generation_name = name.into();
        self
    }

    /// Adds a target to the pre-load list.
    #[must_use]
    pub fn precache_asset(mut self, target: impl Into<String>) -> Self {
        self.precache_list.push(target.into());
        self
    }

    /// Adds a path prefix the cache must bypass.
    #[must_use]
    pub fn bypass_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bypass_prefixes.push(prefix.into());
        self
    }

    /// Adds a path suffix whose responses are stored on success.
    #[must_use]
    pub fn cacheable_extension(mut self, extension: impl Into<String>) -> Self {
        self.cacheable_extensions.push(extension.into());
        self
    }
}
