//! Turns a range of a video clip into an animated GIF.
//!
//! A [`Converter`] drives ffmpeg (or any other [`Engine`]) through a
//! palettegen/paletteuse filter graph, one conversion at a time, and hands
//! the result to a [`Transport`] that decides what the caller gets back.

mod command;
mod converter;
mod engine;
mod error;
mod ffmpeg;
mod input;
mod options;
#[cfg(feature = "tauri")]
pub mod plugin;
mod transport;

pub use command::{build_command, filter_graph, format_number, INPUT_SLOT, OUTPUT_SLOT};
pub use converter::{ConversionState, Converter, Phase};
pub use engine::{Engine, ProgressReceiver};
pub use error::{Error, Result};
pub use ffmpeg::{EngineConfig, FfmpegEngine, FFMPEG_ENV};
pub use input::InputSource;
pub use options::{ConversionOptions, PartialOptions};
pub use transport::{
    data_url, FileTransport, GifHandle, GifResult, MemoryTransport, Transport, GIF_MIME,
};
