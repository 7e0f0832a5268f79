use crate::error::{Error, Result};
use std::borrow::Cow;
use std::path::PathBuf;

/// Where the source video comes from. The converter only borrows it.
#[derive(Debug, Clone)]
pub enum InputSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl InputSource {
    pub async fn read(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            InputSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            InputSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Cow::Owned)
                .map_err(|source| Error::InputRead {
                    path: Some(path.clone()),
                    source,
                }),
        }
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

impl From<PathBuf> for InputSource {
    fn from(path: PathBuf) -> Self {
        InputSource::Path(path)
    }
}
