use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{VerifyError, Result};

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "IDVERIFY_API_URL";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String { "http://localhost:5000/api/v1".to_string() }
fn default_timeout() -> u64 { 30 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_redirect_uri() -> String { "http://localhost:3000/auth/callback".to_string() }
fn default_authorize_url() -> String { "https://www.linkedin.com/oauth/v2/authorization".to_string() }
fn default_scope() -> String { "openid profile email".to_string() }

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            authorize_url: default_authorize_url(),
            scope: default_scope(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
}

fn default_detector_path() -> PathBuf { PathBuf::from("models/face_detector.onnx") }

impl Default for ModelConfig {
    fn default() -> Self {
        Self { detector_path: default_detector_path() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_input_size() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_optimization_level() -> u32 { 3 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_input_size(),
            input_height: default_input_size(),
            detection_confidence: default_detection_confidence(),
            optimization_level: default_optimization_level(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewConfig {
    /// Edge length of the square thumbnail kept for a selected picture.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    #[serde(default = "default_true")]
    pub enable_ascii_preview: bool,
    #[serde(default)]
    pub ascii_width: Option<usize>,
    #[serde(default)]
    pub ascii_height: Option<usize>,
}

fn default_thumbnail_size() -> u32 { 200 }
fn default_true() -> bool { true }

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: default_thumbnail_size(),
            enable_ascii_preview: true,
            ascii_width: None,
            ascii_height: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_poll_interval() -> u64 { 30 }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { poll_interval_seconds: default_poll_interval() }
    }
}

impl Config {
    /// Loads from the dev config in dev mode, the system config otherwise.
    pub fn load(dev_mode: bool) -> Result<Self> {
        let path = if dev_mode {
            crate::common::paths::dev_config_file()
        } else {
            crate::common::paths::system_config_file()
        };
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Config file not found: {}. Please create it from configs/idverify.toml.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| VerifyError::Other(anyhow::anyhow!("Config parse error: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!("API base URL overridden by {}", API_URL_ENV);
                self.api.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url).map_err(|e| {
            VerifyError::Other(anyhow::anyhow!(
                "API base URL is not a valid URL ({}): {}", self.api.base_url, e
            ))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "API base URL must use http or https, got {}", base.scheme()
            )));
        }

        if self.api.timeout_seconds < 1 || self.api.timeout_seconds > 300 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Timeout must be between 1 and 300 seconds, got {}",
                self.api.timeout_seconds
            )));
        }

        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.preview.thumbnail_size == 0 || self.preview.thumbnail_size > 2048 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Thumbnail size must be between 1 and 2048, got {}",
                self.preview.thumbnail_size
            )));
        }

        if self.notifications.poll_interval_seconds == 0 {
            return Err(VerifyError::Other(anyhow::anyhow!(
                "Notification poll interval must be at least 1 second"
            )));
        }

        Ok(())
    }
}
