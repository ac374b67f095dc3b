use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::MotionGeometry;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub captioning: CaptioningConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Sensor rotation in degrees. Only meaningful to the frame source.
    #[serde(default = "default_rotation")]
    pub rotation: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Fraction of blocks that must show movement.
    #[serde(default = "default_block_fraction")]
    pub block_fraction: f64,
    /// How many screens those blocks must move per second.
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Seconds without motion before a scene is considered complete.
    #[serde(default = "default_falloff_secs")]
    pub falloff_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_scene_capacity")]
    pub scene: usize,
    #[serde(default = "default_motion_capacity")]
    pub motion: usize,
    #[serde(default = "default_picture_capacity")]
    pub picture: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptioningConfig {
    #[serde(default = "default_caption_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_caption_features")]
    pub features: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Ingestion URL. When unset, records are written to the log instead.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_replay_path")]
    pub replay_path: PathBuf,
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            rotation: default_rotation(),
            block_size: default_block_size(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            block_fraction: default_block_fraction(),
            speed: default_speed(),
            falloff_secs: default_falloff_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            scene: default_scene_capacity(),
            motion: default_motion_capacity(),
            picture: default_picture_capacity(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for CaptioningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_caption_endpoint(),
            features: default_caption_features(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            device_id: default_device_id(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            replay_path: default_replay_path(),
            realtime: default_realtime(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            queues: QueueConfig::default(),
            retry: RetryConfig::default(),
            captioning: CaptioningConfig::default(),
            telemetry: TelemetryConfig::default(),
            storage: StorageConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid("camera resolution must be non-zero".into()));
        }
        if cam.fps == 0 {
            return Err(ConfigError::Invalid("camera.fps must be non-zero".into()));
        }
        if cam.block_size == 0 {
            return Err(ConfigError::Invalid("camera.block_size must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.detection.block_fraction) {
            return Err(ConfigError::Invalid(format!(
                "detection.block_fraction must be within [0, 1], got {}",
                self.detection.block_fraction
            )));
        }
        let det = &self.detection;
        if !det.falloff_secs.is_finite() || det.falloff_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.falloff_secs must be a finite, non-negative number, got {}",
                det.falloff_secs
            )));
        }
        if !det.speed.is_finite() || det.speed < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.speed must be a finite, non-negative number, got {}",
                det.speed
            )));
        }
        let q = &self.queues;
        if q.scene == 0 || q.motion == 0 || q.picture == 0 {
            return Err(ConfigError::Invalid("queue capacities must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Motion block grid implied by the camera resolution.
    pub fn geometry(&self) -> MotionGeometry {
        MotionGeometry::from_resolution(self.camera.width, self.camera.height, self.camera.block_size)
    }

    pub fn falloff(&self) -> Duration {
        Duration::from_secs_f64(self.detection.falloff_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry.backoff_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_rotation() -> u32 {
    180
}
fn default_block_size() -> u32 {
    16
}
fn default_block_fraction() -> f64 {
    0.008
}
fn default_speed() -> f64 {
    2.0
}
fn default_falloff_secs() -> f64 {
    0.75
}
fn default_scene_capacity() -> usize {
    3
}
fn default_motion_capacity() -> usize {
    // Ten seconds of motion data at the default frame rate.
    (default_fps() * 10) as usize
}
fn default_picture_capacity() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_caption_endpoint() -> String {
    "https://westus.api.cognitive.microsoft.com/vision/v1.0/analyze".into()
}
fn default_caption_features() -> String {
    "Color,Categories,Tags,Description".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_device_id() -> String {
    "room-glimpse".into()
}
fn default_data_folder() -> PathBuf {
    PathBuf::from("./data")
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_replay_path() -> PathBuf {
    PathBuf::from("capture.jsonl")
}
fn default_realtime() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.queues.motion, 300);
        assert_eq!(config.queues.scene, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.telemetry.endpoint.is_none());
        assert_eq!(config.falloff(), Duration::from_millis(750));
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [camera]
            width = 320
            height = 240
            fps = 15

            [detection]
            falloff_secs = 0.5

            [telemetry]
            endpoint = "http://localhost:9000/ingest"
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.block_size, 16);
        assert_eq!(config.detection.falloff_secs, 0.5);
        assert_eq!(
            config.telemetry.endpoint.as_deref(),
            Some("http://localhost:9000/ingest")
        );
        let geo = config.geometry();
        assert_eq!((geo.width, geo.height), (21, 16));
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = Config::parse("[queues]\nscene = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = Config::parse("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn fraction_out_of_range_rejected() {
        let err = Config::parse("[detection]\nblock_fraction = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn nonfinite_falloff_rejected() {
        for value in ["inf", "nan", "-inf"] {
            let err = Config::parse(&format!("[detection]\nfalloff_secs = {value}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{value} accepted");
        }
    }

    #[test]
    fn nonfinite_speed_rejected() {
        for value in ["inf", "nan"] {
            let err = Config::parse(&format!("[detection]\nspeed = {value}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{value} accepted");
        }
    }

    #[test]
    fn hand_built_sections_match_file_defaults() {
        let parsed = Config::parse("[captioning]\n[telemetry]\n").unwrap();
        let built = Config::default();
        assert_eq!(parsed.captioning.api_key, built.captioning.api_key);
        assert_eq!(parsed.captioning.endpoint, built.captioning.endpoint);
        assert_eq!(built.telemetry.api_key, None);
        assert_eq!(parsed.telemetry.device_id, built.telemetry.device_id);
        assert_eq!(built.storage.jpeg_quality, 85);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[camera\nwidth = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
