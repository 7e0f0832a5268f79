use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The transcoding engine could not be initialized. Not retried within a conversion.
    #[error("Failed to load ffmpeg: {0}")]
    EngineLoad(String),

    #[error("Failed to read input video {path:?}: {source}")]
    InputRead {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero engine exit. `diagnostics` is the engine's stderr, untouched.
    #[error("FFmpeg encoding failed (exit: {status:?})\n{diagnostics}")]
    Transcode {
        status: Option<i32>,
        diagnostics: String,
    },

    #[error("FFmpeg produced no output in '{0}'")]
    OutputMissing(String),

    #[error("A conversion is already in progress")]
    ConversionInProgress,

    #[error("Virtual file '{name}' is unusable: {source}")]
    VirtualFs {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist GIF: {0}")]
    Transport(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
