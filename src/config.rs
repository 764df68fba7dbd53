use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BackendKind;
use crate::labels::ClassLabelMap;

const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_FILE_FPS_HINT: u32 = 25;
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_SNAPSHOT_EVERY: u32 = 30;
const DEFAULT_TICK_INTERVAL_MS: u64 = 10;
const DEFAULT_RETRY_DELAY_MS: u64 = 100;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 500;
const DEFAULT_PAUSED_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    file: Option<FileConfigFile>,
    detector: Option<DetectorConfigFile>,
    labels: Option<BTreeMap<String, String>>,
    display: Option<DisplayConfigFile>,
    playback: Option<PlaybackConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfigFile {
    fps_hint: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    replay_path: Option<PathBuf>,
    input_size: Option<u32>,
    names: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PlaybackConfigFile {
    tick_interval_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    error_backoff_ms: Option<u64>,
    paused_interval_ms: Option<u64>,
    pace_to_source_fps: Option<bool>,
    status_overlay: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub file: FileSettings,
    pub detector: DetectorSettings,
    /// Fallback class labels. `None` means "rely on the detector's own names".
    pub labels: Option<ClassLabelMap>,
    pub display: DisplaySettings,
    pub playback: PlaybackSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Overrides the device derived from the index (e.g. "stub://cam").
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl CameraSettings {
    /// Device node for a camera index, unless an explicit device is configured.
    pub fn device_for(&self, index: u32) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", index))
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: DEFAULT_CAMERA_INDEX,
            device: None,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: DEFAULT_CAMERA_FPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSettings {
    pub fps_hint: u32,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            fps_hint: DEFAULT_FILE_FPS_HINT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
    pub replay_path: Option<PathBuf>,
    pub input_size: u32,
    /// Names the model was exported with (tract backend).
    pub model_names: Option<ClassLabelMap>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Stub,
            model_path: None,
            replay_path: None,
            input_size: DEFAULT_MODEL_INPUT_SIZE,
            model_names: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub viewport: Option<(u32, u32)>,
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            viewport: None,
            snapshot_dir: None,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

/// Tick timing for the playback controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Delay between processed frames; yields to the host loop.
    pub tick_interval: Duration,
    /// Delay before retrying after a dropped camera read.
    pub retry_delay: Duration,
    /// Delay after a detector failure.
    pub error_backoff: Duration,
    /// Redraw interval for the held frame while paused.
    pub paused_interval: Duration,
    /// Space file frames at the file's native rate instead of `tick_interval`.
    pub pace_to_source_fps: bool,
    /// Stamp "PLAYING"/"PAUSED" on displayed frames.
    pub status_overlay: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            error_backoff: Duration::from_millis(DEFAULT_ERROR_BACKOFF_MS),
            paused_interval: Duration::from_millis(DEFAULT_PAUSED_INTERVAL_MS),
            pace_to_source_fps: false,
            status_overlay: false,
        }
    }
}

impl AppConfig {
    /// Load from `HELMET_WATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like `load`, but an explicit config path wins over `HELMET_WATCH_CONFIG`.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("HELMET_WATCH_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            index: camera_file.index.unwrap_or(DEFAULT_CAMERA_INDEX),
            device: camera_file.device,
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };
        let file_settings = FileSettings {
            fps_hint: file
                .file
                .and_then(|f| f.fps_hint)
                .unwrap_or(DEFAULT_FILE_FPS_HINT),
        };
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: match detector_file.backend.as_deref() {
                Some(name) => name.parse()?,
                None => BackendKind::Stub,
            },
            model_path: detector_file.model_path,
            replay_path: detector_file.replay_path,
            input_size: detector_file
                .input_size
                .unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            model_names: detector_file
                .names
                .map(|names| labels_from_table(&names, "detector.names"))
                .transpose()?,
        };
        let labels = file
            .labels
            .map(|names| labels_from_table(&names, "labels"))
            .transpose()?;
        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            viewport: match (display_file.width, display_file.height) {
                (Some(w), Some(h)) => Some((w, h)),
                (None, None) => None,
                _ => return Err(anyhow!("display.width and display.height must be set together")),
            },
            snapshot_dir: display_file.snapshot_dir,
            snapshot_every: display_file
                .snapshot_every
                .unwrap_or(DEFAULT_SNAPSHOT_EVERY),
        };
        let playback_file = file.playback.unwrap_or_default();
        let ms = |value: Option<u64>, default: u64| Duration::from_millis(value.unwrap_or(default));
        let playback = PlaybackSettings {
            tick_interval: ms(playback_file.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS),
            retry_delay: ms(playback_file.retry_delay_ms, DEFAULT_RETRY_DELAY_MS),
            error_backoff: ms(playback_file.error_backoff_ms, DEFAULT_ERROR_BACKOFF_MS),
            paused_interval: ms(playback_file.paused_interval_ms, DEFAULT_PAUSED_INTERVAL_MS),
            pace_to_source_fps: playback_file.pace_to_source_fps.unwrap_or(false),
            status_overlay: playback_file.status_overlay.unwrap_or(false),
        };
        Ok(Self {
            camera,
            file: file_settings,
            detector,
            labels,
            display,
            playback,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("HELMET_WATCH_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.parse()?;
            }
        }
        if let Ok(path) = std::env::var("HELMET_WATCH_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("HELMET_WATCH_REPLAY") {
            if !path.trim().is_empty() {
                self.detector.replay_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(index) = std::env::var("HELMET_WATCH_CAMERA_INDEX") {
            self.camera.index = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("HELMET_WATCH_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Ok(device) = std::env::var("HELMET_WATCH_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = Some(device);
            }
        }
        if let Ok(labels) = std::env::var("HELMET_WATCH_LABELS") {
            if !labels.trim().is_empty() {
                self.labels = Some(
                    ClassLabelMap::parse(&labels)
                        .map_err(|e| anyhow!("HELMET_WATCH_LABELS: {}", e))?,
                );
            }
        }
        if let Ok(dir) = std::env::var("HELMET_WATCH_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.display.snapshot_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        if self.display.snapshot_every == 0 {
            return Err(anyhow!("display.snapshot_every must be at least 1"));
        }
        if let Some((w, h)) = self.display.viewport {
            if w == 0 || h == 0 {
                return Err(anyhow!("display viewport must be greater than zero"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn labels_from_table(table: &BTreeMap<String, String>, section: &str) -> Result<ClassLabelMap> {
    let entries = table
        .iter()
        .map(|(id, name)| format!("{}={}", id, name))
        .collect::<Vec<_>>()
        .join(",");
    ClassLabelMap::parse(&entries).map_err(|e| anyhow!("{}: {}", section, e))
}
