//! Contract between the converter and a transcoding engine.
//!
//! An engine owns a private namespace of named byte buffers (its virtual
//! filesystem) and runs positional-argument commands against it.

use crate::error::Result;
use std::future::Future;
use tokio::sync::broadcast;

/// Fractions in `[0, 1]` published while `exec` runs. Dropping the receiver
/// ends the subscription.
pub type ProgressReceiver = broadcast::Receiver<f64>;

pub trait Engine: Send + Sync {
    /// Loads the engine once. Later calls are no-ops.
    fn ensure_loaded(&self) -> impl Future<Output = Result<()>> + Send;

    /// Stores `bytes` under `name`, replacing any previous content.
    fn write_file(&self, name: &str, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Runs one command. Fails with `Error::Transcode` carrying the engine's
    /// diagnostics when the engine rejects it.
    fn exec(&self, args: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Fails with `Error::OutputMissing` when `name` was never produced.
    fn read_file(&self, name: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Removing a file that does not exist succeeds.
    fn delete_file(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// No final `1.0` is promised.
    fn subscribe_progress(&self) -> ProgressReceiver;
}
