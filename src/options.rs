//! Conversion options and their persistence across sessions.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cli::TargetFormat;
use crate::error::ConvertError;

pub const FORMAT_KEY: &str = "rconv.target_format";
pub const QUALITY_KEY: &str = "rconv.quality";

pub const DEFAULT_QUALITY: u8 = 80;
pub const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub target_format: TargetFormat,
    pub quality: u8,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            target_format: TargetFormat::default(),
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ConversionOptions {
    /// Sets the quality control. Values outside 1-100 are rejected like the
    /// numeric input would reject them.
    pub fn set_quality(&mut self, quality: u8) -> bool {
        if QUALITY_RANGE.contains(&quality) {
            self.quality = quality;
            true
        } else {
            false
        }
    }
}

/// String key/value storage for client-side settings.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConvertError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConvertError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings kept as a flat JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileStore {
    /// Opens the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!("Ignoring malformed settings file {:?}: {}", path, e);
                    Map::new()
                }
            },
            Err(_) => {
                tracing::debug!("No settings file at {:?}", path);
                Map::new()
            }
        };
        Self { path, values }
    }

    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("rconv").join("settings.json"))
        } else {
            dirs::home_dir().map(|home| home.join(".config").join("rconv").join("settings.json"))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConvertError> {
        self.values.insert(key.to_string(), Value::String(value.to_string()));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ConvertError::Storage(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Reads and writes [`ConversionOptions`] under fixed keys.
pub struct OptionsStore {
    store: Box<dyn KeyValueStore>,
}

impl OptionsStore {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Applies stored values that the controls would accept; anything else
    /// leaves the current value in place.
    pub fn load(&self, options: &mut ConversionOptions) {
        if let Some(raw) = self.store.get(FORMAT_KEY) {
            match raw.parse::<TargetFormat>() {
                Ok(format) => options.target_format = format,
                Err(_) => tracing::debug!("Ignoring stored format {:?}", raw),
            }
        }
        if let Some(raw) = self.store.get(QUALITY_KEY) {
            let accepted = raw
                .trim()
                .parse::<u8>()
                .map(|q| options.set_quality(q))
                .unwrap_or(false);
            if !accepted {
                tracing::debug!("Ignoring stored quality {:?}", raw);
            }
        }
    }

    pub fn save(&mut self, options: &ConversionOptions) -> Result<(), ConvertError> {
        self.store.set(FORMAT_KEY, options.target_format.as_str())?;
        self.store.set(QUALITY_KEY, &options.quality.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_stored() {
        let store = OptionsStore::new(Box::new(MemoryStore::new()));
        let mut options = ConversionOptions::default();
        store.load(&mut options);
        assert_eq!(options, ConversionOptions::default());
        assert_eq!(options.quality, 80);
    }

    #[test]
    fn test_round_trip_through_fresh_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut first = OptionsStore::new(Box::new(FileStore::open(&path)));
        let options = ConversionOptions {
            target_format: TargetFormat::Webp,
            quality: 42,
        };
        first.save(&options).unwrap();

        let second = OptionsStore::new(Box::new(FileStore::open(&path)));
        let mut loaded = ConversionOptions::default();
        second.load(&mut loaded);
        assert_eq!(loaded, options);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let mut kv = MemoryStore::new();
        kv.set(FORMAT_KEY, "heic").unwrap();
        kv.set(QUALITY_KEY, "250").unwrap();
        let store = OptionsStore::new(Box::new(kv));

        let mut options = ConversionOptions {
            target_format: TargetFormat::Png,
            quality: 60,
        };
        store.load(&mut options);
        assert_eq!(options.target_format, TargetFormat::Png);
        assert_eq!(options.quality, 60);
    }

    #[test]
    fn test_corrupt_settings_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path);
        assert!(store.get(FORMAT_KEY).is_none());
    }

    #[test]
    fn test_set_quality_range() {
        let mut options = ConversionOptions::default();
        assert!(!options.set_quality(0));
        assert!(!options.set_quality(101));
        assert!(options.set_quality(100));
        assert_eq!(options.quality, 100);
    }
}
