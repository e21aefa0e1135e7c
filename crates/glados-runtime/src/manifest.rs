//! Plugin manifest.
//!
//! An ordered JSON object mapping a module identifier to the plugin class
//! and category to load:
//!
//! ```json
//! {
//!     "alive": {"plugin_class": "IAmAlive", "plugin_type": "normal"},
//!     "remind": {"plugin_class": "RemindMe", "plugin_type": "timed"}
//! }
//! ```
//!
//! Entry order is registration order, so the manifest is deserialized into
//! a `Vec` rather than a map.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::error::ManifestError;

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    /// Module identifier (the JSON key).
    #[serde(skip)]
    pub module: String,
    /// Registered class name.
    pub plugin_class: String,
    /// Declared category, validated at registration.
    pub plugin_type: String,
}

/// The parsed manifest, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parses a manifest document.
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads the manifest at `path`.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Reads the manifest at `path`; a missing or malformed file is logged
    /// and yields an empty manifest.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::read(path) {
            Ok(manifest) => {
                info!(path = %path.display(), entries = manifest.len(), "Plugin manifest loaded");
                manifest
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load plugins, continuing without any");
                Self::default()
            }
        }
    }

    /// Builds a manifest from `(module, class, category)` triples.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(module, class, category)| ManifestEntry {
                    module: module.to_string(),
                    plugin_class: class.to_string(),
                    plugin_type: category.to_string(),
                })
                .collect(),
        }
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest lists no plugins.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of module name to plugin entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Manifest, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((module, mut entry)) = map.next_entry::<String, ManifestEntry>()? {
                    entry.module = module;
                    entries.push(entry);
                }
                Ok(Manifest { entries })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}
