use crate::engine::{Engine, ProgressReceiver};
use crate::error::{Error, Result};
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info};

#[cfg(target_os = "windows")]
const FFMPEG_NAME: &str = "ffmpeg.exe";

#[cfg(not(target_os = "windows"))]
const FFMPEG_NAME: &str = "ffmpeg";

/// Environment variable pointing at an ffmpeg binary to use instead of the search.
pub const FFMPEG_ENV: &str = "GIF_CONVERTER_FFMPEG";

// Prepended to every command; callers never see them.
const ENGINE_FLAGS: [&str; 6] = ["-hide_banner", "-nostdin", "-y", "-progress", "pipe:1", "-nostats"];

const PROGRESS_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    binary: Option<PathBuf>,
    resource_dir: Option<PathBuf>,
    env_override: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: None,
            resource_dir: None,
            env_override: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this binary and skip the search entirely.
    pub fn with_binary<P: AsRef<Path>>(mut self, binary: P) -> Self {
        self.binary = Some(binary.as_ref().to_path_buf());
        self
    }

    /// Directory containing a bundled `ffmpeg/` folder (an app's resource dir).
    pub fn with_resource_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.resource_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env_override(mut self, enabled: bool) -> Self {
        self.env_override = enabled;
        self
    }
}

fn find_binary(config: &EngineConfig) -> PathBuf {
    // 1. Explicit configuration
    if let Some(binary) = &config.binary {
        return binary.clone();
    }

    // 2. Environment override
    if config.env_override {
        if let Some(path) = std::env::var_os(FFMPEG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
    }

    // 3. Development path: target/debug/../../ffmpeg/
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(target_dir) = exe_path.parent() {
            let dev_path = target_dir
                .join("..")
                .join("..")
                .join("ffmpeg")
                .join(FFMPEG_NAME);
            if dev_path.exists() {
                return dev_path.canonicalize().unwrap_or(dev_path);
            }
        }
    }

    // 4. Bundled resources
    if let Some(resource_dir) = &config.resource_dir {
        let bundled = resource_dir.join("ffmpeg").join(FFMPEG_NAME);
        if bundled.exists() {
            return bundled;
        }
    }

    // 5. System PATH
    PathBuf::from(FFMPEG_NAME)
}

#[cfg_attr(not(target_os = "windows"), allow(unused_variables))]
fn hide_console(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    }
}

#[derive(Debug)]
struct Loaded {
    binary: PathBuf,
    workdir: TempDir,
}

/// Engine backed by an ffmpeg executable. Its virtual filesystem is a
/// private temporary directory removed when the engine is dropped.
#[derive(Debug)]
pub struct FfmpegEngine {
    config: EngineConfig,
    loaded: OnceCell<Loaded>,
    progress: broadcast::Sender<f64>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            config,
            loaded: OnceCell::new(),
            progress,
        }
    }

    /// Binary in use, once loaded.
    pub fn binary(&self) -> Option<&Path> {
        self.loaded.get().map(|l| l.binary.as_path())
    }

    /// Backing directory of the virtual filesystem, once loaded.
    pub fn work_dir(&self) -> Option<&Path> {
        self.loaded.get().map(|l| l.workdir.path())
    }

    async fn load(&self) -> Result<Loaded> {
        let binary = find_binary(&self.config);

        let mut cmd = Command::new(&binary);
        cmd.args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console(&mut cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::EngineLoad(format!("failed to run {:?}: {}", binary, e)))?;

        if !output.status.success() {
            return Err(Error::EngineLoad(format!(
                "{:?} -version exited with {:?}\nstderr: {}",
                binary,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default();

        let workdir = tempfile::Builder::new()
            .prefix("gif-converter-")
            .tempdir()
            .map_err(|e| Error::EngineLoad(format!("failed to create working directory: {}", e)))?;

        info!(binary = %binary.display(), version = %version, "ffmpeg loaded");

        Ok(Loaded { binary, workdir })
    }

    fn require_loaded(&self) -> Result<&Loaded> {
        self.loaded
            .get()
            .ok_or_else(|| Error::EngineLoad("ffmpeg is not loaded".to_string()))
    }
}

fn slot_path(workdir: &Path, name: &str) -> Result<PathBuf> {
    let is_bare = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
    if !is_bare {
        return Err(Error::VirtualFs {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a bare file name"),
        });
    }
    Ok(workdir.join(name))
}

fn transcode_error(diagnostics: impl Into<String>) -> Error {
    Error::Transcode {
        status: None,
        diagnostics: diagnostics.into(),
    }
}

fn out_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^out_time_us=(\d+)").expect("out_time regex"))
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("duration regex")
    })
}

/// `out_time_us=<microseconds>` from `-progress` output, in seconds.
fn parse_out_time(line: &str) -> Option<f64> {
    let caps = out_time_regex().captures(line.trim())?;
    let microseconds = caps[1].parse::<f64>().ok()?;
    Some(microseconds / 1_000_000.0)
}

/// Input length from the `Duration: HH:MM:SS.cc` banner line, in seconds.
fn parse_input_duration(line: &str) -> Option<f64> {
    let caps = duration_regex().captures(line)?;
    let hours = caps[1].parse::<f64>().ok()?;
    let minutes = caps[2].parse::<f64>().ok()?;
    let seconds = caps[3].parse::<f64>().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn flag_value(args: &[String], flag: &str) -> Option<f64> {
    let i = args.iter().position(|a| a == flag)?;
    args.get(i + 1)?.parse().ok()
}

/// How many seconds of output the command will produce, if known.
fn output_span(args: &[String], input_duration: Option<f64>) -> Option<f64> {
    let limit = flag_value(args, "-t");
    let start = flag_value(args, "-ss").unwrap_or(0.0);
    let remaining = input_duration.map(|d| (d - start).max(0.0));

    let span = match (limit, remaining) {
        (Some(limit), Some(remaining)) => limit.min(remaining),
        (Some(limit), None) => limit,
        (None, remaining) => remaining?,
    };
    (span > 0.0).then_some(span)
}

async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R, input_duration: &OnceLock<f64>) -> String {
    let mut buf = String::new();
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if input_duration.get().is_none() {
            if let Some(seconds) = parse_input_duration(&line) {
                let _ = input_duration.set(seconds);
            }
        }
        buf.push_str(&line);
        buf.push('\n');
    }
    buf
}

impl Engine for FfmpegEngine {
    async fn ensure_loaded(&self) -> Result<()> {
        self.loaded.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = slot_path(self.require_loaded()?.workdir.path(), name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| Error::VirtualFs {
                name: name.to_string(),
                source,
            })
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        let loaded = self.require_loaded()?;

        let mut cmd = Command::new(&loaded.binary);
        cmd.args(ENGINE_FLAGS)
            .args(args)
            .current_dir(loaded.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_console(&mut cmd);

        debug!(args = ?args, "Executing ffmpeg");

        let mut child = cmd
            .spawn()
            .map_err(|e| transcode_error(format!("Failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transcode_error("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| transcode_error("Failed to capture stderr"))?;

        // stderr must be drained alongside stdout or ffmpeg blocks on a full pipe.
        let input_duration = OnceLock::new();
        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(seconds) = parse_out_time(&line) else {
                    continue;
                };
                if let Some(span) = output_span(args, input_duration.get().copied()) {
                    let _ = self.progress.send((seconds / span).clamp(0.0, 1.0));
                }
            }
        };
        let (diagnostics, ()) = tokio::join!(drain_stderr(stderr, &input_duration), read_progress);

        let status = child
            .wait()
            .await
            .map_err(|e| transcode_error(format!("FFmpeg process error: {}", e)))?;

        if !status.success() {
            return Err(Error::Transcode {
                status: status.code(),
                diagnostics,
            });
        }

        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = slot_path(self.require_loaded()?.workdir.path(), name)?;
        match tokio::fs::read(&path).await {
            // ffmpeg leaves an empty file behind when no frame was encoded
            Ok(bytes) if bytes.is_empty() => Err(Error::OutputMissing(name.to_string())),
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::OutputMissing(name.to_string()))
            }
            Err(source) => Err(Error::VirtualFs {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let Some(loaded) = self.loaded.get() else {
            return Ok(());
        };
        let path = slot_path(loaded.workdir.path(), name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::VirtualFs {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn subscribe_progress(&self) -> ProgressReceiver {
        self.progress.subscribe()
    }
}
