//! Async file-based config source with SHA256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for every supported file
//! format. The format is chosen from the file extension when the source
//! is built; the file is read asynchronously via Tokio, parsed, validated,
//! and hashed for version tracking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex, SUPPORTED_EXTENSIONS};
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::GatehouseError;

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    format: &'static str,
}

impl FileSource {
    /// Build a source for `path`, rejecting extensions no enabled feature can parse.
    pub fn for_path(path: &Path) -> Result<Self, GatehouseError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let format = SUPPORTED_EXTENSIONS
            .iter()
            .copied()
            .find(|supported| *supported == ext)
            .ok_or_else(|| GatehouseError::UnsupportedFormat(ext.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, GatehouseError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GatehouseError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                GatehouseError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.format
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), GatehouseError> {
        let content = self.read_content().await?;
        let config = parse_config_str(self.format, &content, &self.path.display().to_string())?;

        if let Err(errors) = validate(&config) {
            return Err(GatehouseError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, GatehouseError> {
        let content = self.read_content().await?;
        let hash = sha256_hex(content.as_bytes());
        Ok(*current != ConfigVersion::Hash(hash))
    }
}
