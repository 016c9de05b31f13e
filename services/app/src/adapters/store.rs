//! services/app/src/adapters/store.rs
//!
//! File-backed implementations of the `TokenStore` and `CardStore` ports.
//! Each store keeps one JSON document; a missing file means nothing is stored.

use async_trait::async_trait;
use saarthi_core::domain::{AuthToken, DailyDraw};
use saarthi_core::ports::{CardStore, PortError, PortResult, TokenStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One JSON document on disk.
#[derive(Debug, Clone)]
struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    async fn read<T: DeserializeOwned>(&self) -> PortResult<Option<T>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            PortError::Unexpected(format!("corrupt file {}: {}", self.path.display(), e))
        })
    }

    async fn write<T: Serialize>(&self, value: &T) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| io_error(&self.path, e))
    }

    async fn remove(&self) -> PortResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}

//=========================================================================================
// Token Store
//=========================================================================================

/// Persists the bearer token between runs.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    file: JsonFile,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile { path: path.into() },
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> PortResult<Option<AuthToken>> {
        self.file.read().await
    }

    async fn save(&self, token: &AuthToken) -> PortResult<()> {
        self.file.write(token).await
    }

    async fn clear(&self) -> PortResult<()> {
        self.file.remove().await
    }
}

//=========================================================================================
// Card Store
//=========================================================================================

/// Persists the daily wisdom card.
#[derive(Debug, Clone)]
pub struct FileCardStore {
    file: JsonFile,
}

impl FileCardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile { path: path.into() },
        }
    }
}

#[async_trait]
impl CardStore for FileCardStore {
    async fn load(&self) -> PortResult<Option<DailyDraw>> {
        self.file.read().await
    }

    async fn save(&self, draw: &DailyDraw) -> PortResult<()> {
        self.file.write(draw).await
    }

    async fn clear(&self) -> PortResult<()> {
        self.file.remove().await
    }
}
