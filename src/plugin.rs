//! Tauri plugin exposing the converter to a webview.
//!
//! ```ignore
//! tauri::Builder::default()
//!     .plugin(gif_converter_lib::plugin::init())
//! ```
//!
//! The frontend invokes `plugin:gif-converter|convert_to_gif` and listens
//! for `gif-conversion-progress` events carrying a [`ConversionState`].
//! GIFs are persisted under the app cache dir; the returned `outputPath`
//! goes through `convertFileSrc` (the `protocol-asset` feature) for display.

use crate::{
    ConversionState, Converter, EngineConfig, FfmpegEngine, FileTransport, GifResult, InputSource,
    PartialOptions,
};
use std::path::PathBuf;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Emitter, Manager, Runtime, State};

pub const PROGRESS_EVENT: &str = "gif-conversion-progress";

pub type AppConverter = Converter<FfmpegEngine, FileTransport>;

#[tauri::command]
async fn convert_to_gif(
    converter: State<'_, AppConverter>,
    input_path: String,
    options: Option<PartialOptions>,
) -> Result<GifResult, String> {
    let input = InputSource::Path(PathBuf::from(input_path));
    let handle = converter
        .convert(&input, options.unwrap_or_default())
        .await
        .map_err(|e| e.to_string())?;
    Ok(GifResult::from(&handle))
}

#[tauri::command]
fn conversion_state(converter: State<'_, AppConverter>) -> ConversionState {
    converter.state()
}

pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("gif-converter")
        .invoke_handler(tauri::generate_handler![convert_to_gif, conversion_state])
        .setup(|app, _api| {
            let mut config = EngineConfig::new();
            if let Ok(resource_dir) = app.path().resource_dir() {
                config = config.with_resource_dir(resource_dir);
            }

            let transport = match app.path().app_cache_dir() {
                Ok(cache_dir) => FileTransport::new(cache_dir.join("gif-converter")),
                Err(_) => FileTransport::default(),
            };

            let converter = Converter::new(FfmpegEngine::new(config), transport);
            let mut updates = converter.subscribe();
            app.manage(converter);

            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                while updates.changed().await.is_ok() {
                    let state = *updates.borrow_and_update();
                    let _ = app.emit(PROGRESS_EVENT, state);
                }
            });

            Ok(())
        })
        .build()
}
