use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_START_TIME: f64 = 0.0;
pub const DEFAULT_DURATION: f64 = 5.0;
pub const DEFAULT_WIDTH: u32 = 480;
pub const DEFAULT_FPS: f64 = 10.0;
pub const DEFAULT_QUALITY: u32 = 10;

/// Fully resolved parameters for one conversion.
///
/// Values are not range checked: whatever the caller asked for is what the
/// engine receives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    pub start_time: f64,
    pub duration: f64,
    pub width: u32,
    pub fps: f64,
    /// Palette quality, 1-30. Accepted but not applied to the filter graph.
    pub quality: u32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            start_time: DEFAULT_START_TIME,
            duration: DEFAULT_DURATION,
            width: DEFAULT_WIDTH,
            fps: DEFAULT_FPS,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ConversionOptions {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Options as they arrive from a caller: any subset of fields, numbers
/// either as JSON numbers or numeric strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialOptions {
    #[serde(deserialize_with = "lenient_f64")]
    pub start_time: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fps: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    pub quality: Option<u32>,
}

impl PartialOptions {
    pub fn with_start_time(mut self, seconds: f64) -> Self {
        self.start_time = Some(seconds);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Fills every missing field with its default. Guarantees completeness only.
    pub fn normalize(self) -> ConversionOptions {
        ConversionOptions {
            start_time: self.start_time.unwrap_or(DEFAULT_START_TIME),
            duration: self.duration.unwrap_or(DEFAULT_DURATION),
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            fps: self.fps.unwrap_or(DEFAULT_FPS),
            quality: self.quality.unwrap_or(DEFAULT_QUALITY),
        }
    }
}

impl From<ConversionOptions> for PartialOptions {
    fn from(options: ConversionOptions) -> Self {
        Self {
            start_time: Some(options.start_time),
            duration: Some(options.duration),
            width: Some(options.width),
            fps: Some(options.fps),
            quality: Some(options.quality),
        }
    }
}

fn coerce_f64(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("number out of range: {}", n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("expected a number, got {:?}", s)),
        other => Err(format!("expected a number, got {}", other)),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    coerce_f64(&value).map_err(serde::de::Error::custom)
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Some(n) = coerce_f64(&value).map_err(serde::de::Error::custom)? else {
        return Ok(None);
    };
    if n.fract() != 0.0 || n < 0.0 || n > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "expected a non-negative integer, got {}",
            n
        )));
    }
    Ok(Some(n as u32))
}
