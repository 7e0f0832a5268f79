use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const GIF_MIME: &str = "image/gif";

/// A finished GIF, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GifHandle {
    Memory(Arc<[u8]>),
    File { path: PathBuf, uri: String, size: u64 },
}

impl GifHandle {
    /// Something a webview can display: a data URL or the persisted file's URI.
    pub fn uri(&self) -> String {
        match self {
            GifHandle::Memory(bytes) => data_url(bytes),
            GifHandle::File { uri, .. } => uri.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            GifHandle::Memory(_) => None,
            GifHandle::File { path, .. } => Some(path),
        }
    }

    /// Byte length of the GIF, as the engine produced it.
    pub fn len(&self) -> u64 {
        match self {
            GifHandle::Memory(bytes) => bytes.len() as u64,
            GifHandle::File { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a webview gets back for a finished GIF.
///
/// `output_path` is set for persisted GIFs; pass it to Tauri's
/// `convertFileSrc` to display the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GifResult {
    pub uri: String,
    pub output_path: Option<String>,
    pub output_size: u64,
}

impl From<&GifHandle> for GifResult {
    fn from(handle: &GifHandle) -> Self {
        Self {
            uri: handle.uri(),
            output_path: handle.path().map(|p| p.to_string_lossy().to_string()),
            output_size: handle.len(),
        }
    }
}

pub fn data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", GIF_MIME, BASE64.encode(bytes))
}

/// Turns the engine's output bytes into a handle, byte for byte.
pub trait Transport: Send + Sync {
    fn deliver(&self, gif: Vec<u8>) -> impl Future<Output = Result<GifHandle>> + Send;
}

/// Keeps the GIF in memory for direct display.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTransport;

impl Transport for MemoryTransport {
    async fn deliver(&self, gif: Vec<u8>) -> Result<GifHandle> {
        Ok(GifHandle::Memory(gif.into()))
    }
}

/// Persists every GIF under its own name in `dir`.
#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
    uri_prefix: String,
}

impl Default for FileTransport {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("gif-converter"),
            uri_prefix: "file://".to_string(),
        }
    }
}

impl FileTransport {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Prefix put verbatim in front of the file path, e.g. `asset://localhost/`.
    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn persist(&self, gif: &[u8]) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("gif-")
            .suffix(".gif")
            .tempfile_in(&self.dir)?;
        file.write_all(gif)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

impl Transport for FileTransport {
    async fn deliver(&self, gif: Vec<u8>) -> Result<GifHandle> {
        let size = gif.len() as u64;
        let transport = self.clone();
        let path = tokio::task::spawn_blocking(move || transport.persist(&gif))
            .await
            .map_err(|e| Error::Transport(std::io::Error::other(e)))?
            .map_err(Error::Transport)?;

        let uri = format!("{}{}", self.uri_prefix, path.display());
        Ok(GifHandle::File { path, uri, size })
    }
}
