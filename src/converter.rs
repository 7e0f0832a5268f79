use crate::command::{build_command, INPUT_SLOT, OUTPUT_SLOT};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::input::InputSource;
use crate::options::{ConversionOptions, PartialOptions};
use crate::transport::{GifHandle, Transport};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Writing,
    Executing,
    Reading,
    CleaningUp,
}

/// What observers see of the running conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionState {
    pub is_processing: bool,
    /// Whole percent, 0-100.
    pub progress: u8,
    pub phase: Phase,
}

impl ConversionState {
    pub const IDLE: ConversionState = ConversionState {
        is_processing: false,
        progress: 0,
        phase: Phase::Idle,
    };
}

fn to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Holds the conversion slot and puts the state back to idle however the
/// conversion ends, including when the `convert` future is dropped midway.
///
/// The slot is released first: anyone woken by the idle state can start the
/// next conversion right away.
struct ActiveConversion<'a> {
    slot: Option<MutexGuard<'a, ()>>,
    state: &'a watch::Sender<ConversionState>,
}

impl Drop for ActiveConversion<'_> {
    fn drop(&mut self) {
        drop(self.slot.take());
        self.state.send_replace(ConversionState::IDLE);
    }
}

/// Runs one video-range-to-GIF conversion at a time against an engine.
pub struct Converter<E, T> {
    engine: E,
    transport: T,
    slot: Mutex<()>,
    state: watch::Sender<ConversionState>,
}

impl<E: Engine, T: Transport> Converter<E, T> {
    pub fn new(engine: E, transport: T) -> Self {
        let (state, _) = watch::channel(ConversionState::IDLE);
        Self {
            engine,
            transport,
            slot: Mutex::new(()),
            state,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> ConversionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversionState> {
        self.state.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.state().is_processing
    }

    /// Converts the `options` range of `input` into a GIF.
    ///
    /// Fails immediately with `Error::ConversionInProgress` if another
    /// conversion holds the engine. Both virtual files are removed before
    /// this returns, whatever the outcome.
    pub async fn convert(&self, input: &InputSource, options: PartialOptions) -> Result<GifHandle> {
        let slot = self.slot.try_lock().map_err(|_| Error::ConversionInProgress)?;
        let _active = ActiveConversion {
            slot: Some(slot),
            state: &self.state,
        };

        let options = options.normalize();
        let span = info_span!(
            "convert",
            start = options.start_time,
            duration = options.duration,
            width = options.width,
            fps = options.fps
        );

        async {
            self.state.send_replace(ConversionState {
                is_processing: true,
                progress: 0,
                phase: Phase::Loading,
            });

            let result = self.run(input, &options).await;
            if let Err(e) = &result {
                error!(error = %e, phase = ?self.state().phase, "Conversion failed");
            }

            self.set_phase(Phase::CleaningUp);
            self.cleanup().await;

            let gif = result?;
            let size = gif.len();
            let handle = self.transport.deliver(gif).await?;
            info!(size, "GIF ready");
            Ok::<_, Error>(handle)
        }
        .instrument(span)
        .await
    }

    async fn run(&self, input: &InputSource, options: &ConversionOptions) -> Result<Vec<u8>> {
        debug!("Loading engine");
        self.engine.ensure_loaded().await?;

        self.set_phase(Phase::Writing);
        let bytes = input.read().await?;
        debug!(bytes = bytes.len(), "Writing input");
        self.engine.write_file(INPUT_SLOT, &bytes).await?;
        drop(bytes);

        self.set_phase(Phase::Executing);
        if options.quality != crate::options::DEFAULT_QUALITY {
            debug!(quality = options.quality, "Quality is not applied to the palette filter");
        }
        let args = build_command(options);
        self.exec_with_progress(&args).await?;

        self.set_phase(Phase::Reading);
        self.engine.read_file(OUTPUT_SLOT).await
    }

    async fn exec_with_progress(&self, args: &[String]) -> Result<()> {
        let mut progress = self.engine.subscribe_progress();
        let exec = self.engine.exec(args);
        tokio::pin!(exec);

        let mut subscribed = true;
        loop {
            tokio::select! {
                result = &mut exec => return result,
                update = progress.recv(), if subscribed => match update {
                    Ok(fraction) => self.publish_progress(fraction),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Progress updates dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => subscribed = false,
                },
            }
        }
    }

    fn publish_progress(&self, fraction: f64) {
        let percent = to_percent(fraction);
        self.state.send_if_modified(|state| {
            if percent > state.progress {
                state.progress = percent;
                true
            } else {
                false
            }
        });
    }

    fn set_phase(&self, phase: Phase) {
        self.state.send_modify(|state| state.phase = phase);
    }

    async fn cleanup(&self) {
        for name in [INPUT_SLOT, OUTPUT_SLOT] {
            if let Err(e) = self.engine.delete_file(name).await {
                warn!(name, error = %e, "Failed to clean up virtual file");
            }
        }
    }
}
