use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureOptions, DeviceSettings};
use crate::control::{ControlInput, normalize_key};
use crate::session::SessionOptions;
use crate::validate_enum;

/// Upper bound for the sleep quanta, in milliseconds
const MAX_QUANTUM_MS: u64 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub capture: CaptureSettings,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub keys: KeySettings,
}

/// General settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between relay statistics log lines (0 disables them)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_interval() -> u64 {
    5
}

/// Capture source settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureSettings {
    /// "device" (V4L2 through GStreamer) or "pattern" (synthetic colour bars)
    #[serde(default = "default_source")]
    pub source: String,

    /// Device index (`/dev/video<N>`) or path
    #[serde(default = "default_device")]
    pub device: String,

    /// Requested mode; 0 lets the device choose
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_true")]
    pub elevate_priority: bool,

    /// Sleep after a skipped read
    #[serde(default = "default_quantum")]
    pub retry_quantum_ms: u64,

    /// How long one device read waits for a frame
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            elevate_priority: true,
            retry_quantum_ms: default_quantum(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

fn default_source() -> String {
    "device".to_string()
}
fn default_device() -> String {
    "0".to_string()
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_fps() -> u32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_quantum() -> u64 {
    1
}
fn default_read_timeout() -> u64 {
    100
}

/// Display settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub vsync: bool,

    #[serde(default)]
    pub show_overlay: bool,

    #[serde(default = "default_true")]
    pub fullscreen: bool,

    /// Render loop sleep when no new frame is available
    #[serde(default = "default_quantum")]
    pub poll_quantum_ms: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            vsync: false,
            show_overlay: false,
            fullscreen: true,
            poll_quantum_ms: default_quantum(),
        }
    }
}

/// Key bindings for the runtime controls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeySettings {
    #[serde(default = "default_overlay_key")]
    pub toggle_overlay: String,

    #[serde(default = "default_vsync_key")]
    pub toggle_vsync: String,

    #[serde(default = "default_exit_key")]
    pub exit: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            toggle_overlay: default_overlay_key(),
            toggle_vsync: default_vsync_key(),
            exit: default_exit_key(),
        }
    }
}

fn default_overlay_key() -> String {
    "F".to_string()
}
fn default_vsync_key() -> String {
    "V".to_string()
}
fn default_exit_key() -> String {
    "Escape".to_string()
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("edb");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.general.log_level)?;
        validate_source(&self.capture.source)?;

        validate_quantum("capture.retry_quantum_ms", self.capture.retry_quantum_ms)?;
        validate_quantum("display.poll_quantum_ms", self.display.poll_quantum_ms)?;
        if self.capture.read_timeout_ms == 0 {
            anyhow::bail!("capture.read_timeout_ms must be greater than 0");
        }

        if self.capture.source == "pattern"
            && (self.capture.width == 0 || self.capture.height == 0 || self.capture.fps == 0)
        {
            anyhow::bail!("The test pattern needs a non-zero width, height and fps");
        }
        if self.capture.source == "device" && self.capture.device.trim().is_empty() {
            anyhow::bail!("capture.device must not be empty");
        }

        self.validate_keys()
    }

    fn validate_keys(&self) -> Result<()> {
        let bindings = [
            ("toggle_overlay", &self.keys.toggle_overlay),
            ("toggle_vsync", &self.keys.toggle_vsync),
            ("exit", &self.keys.exit),
        ];

        for (i, (action, key)) in bindings.iter().enumerate() {
            if key.trim().is_empty() {
                anyhow::bail!("No key bound to {}", action);
            }
            for (other, other_key) in &bindings[i + 1..] {
                if normalize_key(key) == normalize_key(other_key) {
                    anyhow::bail!(
                        "Key {} is bound to both {} and {}",
                        key,
                        action,
                        other
                    );
                }
            }
        }
        Ok(())
    }

    pub fn uses_test_pattern(&self) -> bool {
        self.capture.source == "pattern"
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            device: self.capture.device.clone(),
            width: self.capture.width,
            height: self.capture.height,
            fps: self.capture.fps,
            read_timeout: Duration::from_millis(self.capture.read_timeout_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            capture: CaptureOptions {
                elevate_priority: self.capture.elevate_priority,
                retry_quantum: Duration::from_millis(self.capture.retry_quantum_ms),
            },
            show_overlay: self.display.show_overlay,
            vsync: self.display.vsync,
            stats_interval: Duration::from_secs(self.general.stats_interval_secs),
        }
    }

    pub fn poll_quantum(&self) -> Duration {
        Duration::from_millis(self.display.poll_quantum_ms)
    }

    pub fn control_input(&self) -> ControlInput {
        ControlInput::new(
            &self.keys.toggle_overlay,
            &self.keys.toggle_vsync,
            &self.keys.exit,
        )
    }
}

/// Expand `~` and environment variables in a user-supplied path
pub fn resolve_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map_or_else(|_| path.into(), |p| p.into_owned()))
}

fn validate_log_level(level: &str) -> Result<()> {
    validate_enum!(level, "trace", "debug", "info", "warn", "error")
}

fn validate_source(source: &str) -> Result<()> {
    validate_enum!(source, "device", "pattern")
}

fn validate_quantum(name: &str, millis: u64) -> Result<()> {
    if millis == 0 || millis > MAX_QUANTUM_MS {
        anyhow::bail!(
            "{} must be between 1 and {} ms, got {}",
            name,
            MAX_QUANTUM_MS,
            millis
        );
    }
    Ok(())
}
