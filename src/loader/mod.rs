//! Loading of YAML list files such as the species rarity table.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur during list file loading.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Error when reading the file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when parsing the file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The file does not have a YAML extension.
    #[error("Unsupported configuration format")]
    UnsupportedFormat,
}

/// Reads a list of items stored under a top-level key of a YAML file.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new `ConfigLoader`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the list stored under `key`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, LoaderError> {
        if !self.is_yaml_file() {
            return Err(LoaderError::UnsupportedFormat);
        }

        let content = fs::read_to_string(&self.path)?;
        let config =
            Config::builder().add_source(File::from_str(&content, FileFormat::Yaml)).build()?;

        Ok(config.get(key)?)
    }

    fn is_yaml_file(&self) -> bool {
        matches!(self.path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
    }
}

/// A type that can be loaded as a list from a YAML file.
pub trait Loadable: Sized + DeserializeOwned {
    /// The top-level key holding the list (e.g. "species").
    const KEY: &'static str;

    /// The error type for this item.
    type Error: From<LoaderError>;

    /// Post-deserialization checks and normalization.
    fn validate(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Loads and validates a list of `Loadable` items.
pub fn load_config<T: Loadable>(path: &Path) -> Result<Vec<T>, T::Error> {
    let loader = ConfigLoader::new(path.to_path_buf());
    let mut items: Vec<T> = loader.load(T::KEY)?;

    for item in &mut items {
        item.validate()?;
    }

    Ok(items)
}

/// Returns the modification time of a file, or `None` if it cannot be read.
pub fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
