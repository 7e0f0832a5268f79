#![allow(dead_code)]

use gif_converter_lib::{Engine, Error, ProgressReceiver, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, Notify, OnceCell};

/// In-memory engine that models a clip of `clip_seconds` and records what
/// the converter asked of it.
pub struct StubEngine {
    pub clip_seconds: f64,
    /// Load attempts that reached the runtime, failed ones included.
    pub loads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_load: AtomicBool,
    pub fail_exec: AtomicBool,
    pub fail_delete: AtomicBool,
    pub hold_exec: AtomicBool,
    pub exec_started: Notify,
    pub exec_release: Notify,
    pub progress_script: Vec<f64>,
    runtime: OnceCell<()>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    last_args: Mutex<Vec<String>>,
    progress: broadcast::Sender<f64>,
}

impl StubEngine {
    pub fn new(clip_seconds: f64) -> Self {
        let (progress, _) = broadcast::channel(16);
        Self {
            clip_seconds,
            loads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_load: AtomicBool::new(false),
            fail_exec: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            hold_exec: AtomicBool::new(false),
            exec_started: Notify::new(),
            exec_release: Notify::new(),
            progress_script: vec![0.1, 0.4, 0.4, 0.9, 0.6],
            runtime: OnceCell::new(),
            files: Mutex::new(HashMap::new()),
            last_args: Mutex::new(Vec::new()),
            progress,
        }
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.last_args.lock().unwrap().clone()
    }

    pub fn arg_after(&self, flag: &str) -> Option<String> {
        let args = self.last_args();
        let i = args.iter().position(|a| a == flag)?;
        args.get(i + 1).cloned()
    }

    fn loaded(&self) -> Result<()> {
        if !self.runtime.initialized() {
            return Err(Error::EngineLoad("stub not loaded".to_string()));
        }
        Ok(())
    }
}

fn flag(args: &[String], name: &str) -> f64 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// Output bytes encode the span the stub rendered, so tests can check truncation.
pub fn rendered_seconds(gif: &[u8]) -> f64 {
    let text = std::str::from_utf8(gif).unwrap();
    text.trim_start_matches("GIF89a:").parse().unwrap()
}

impl Engine for StubEngine {
    async fn ensure_loaded(&self) -> Result<()> {
        self.runtime
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                if self.fail_load.load(Ordering::SeqCst) {
                    return Err(Error::EngineLoad("wasm asset unavailable".to_string()));
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.loaded()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.loaded()?;
        *self.last_args.lock().unwrap() = args.to_vec();

        if self.hold_exec.load(Ordering::SeqCst) {
            self.exec_started.notify_one();
            self.exec_release.notified().await;
        }

        if self.fail_exec.load(Ordering::SeqCst) {
            return Err(Error::Transcode {
                status: Some(1),
                diagnostics: "[AVFilterGraph] No such filter: 'palettegen'".to_string(),
            });
        }

        for &fraction in &self.progress_script {
            let _ = self.progress.send(fraction);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let start = flag(args, "-ss");
        let limit = flag(args, "-t");
        let span = limit.min(self.clip_seconds - start);
        if span > 0.0 {
            let output = args.last().cloned().unwrap_or_default();
            self.files
                .lock()
                .unwrap()
                .insert(output, format!("GIF89a:{}", span).into_bytes());
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::OutputMissing(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::VirtualFs {
                name: name.to_string(),
                source: std::io::Error::other("read-only filesystem"),
            });
        }
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    fn subscribe_progress(&self) -> ProgressReceiver {
        self.progress.subscribe()
    }
}
