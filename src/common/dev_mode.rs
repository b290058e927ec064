use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&base_dir)?;
            fs::create_dir_all(base_dir.join("session"))?;
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory holding the persisted session, only set in dev mode.
    pub fn session_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("session"))
    }

    pub fn debug_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("debug"))
    }

    /// Where annotated detection images go; `None` outside dev mode.
    pub fn get_debug_path(&self, prefix: &str) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.debug_dir()
            .map(|dir| dir.join(format!("{}_{}.jpg", prefix, timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_has_no_local_dirs() {
        let dev = DevMode::new(false).unwrap();
        assert!(!dev.is_enabled());
        assert!(dev.session_dir().is_none());
        assert!(dev.get_debug_path("detect").is_none());
    }

    #[test]
    fn enabled_mode_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dev = DevMode::with_base_dir(true, tmp.path().join("dev_data")).unwrap();
        assert!(dev.session_dir().unwrap().is_dir());
        let debug = dev.get_debug_path("detect").unwrap();
        assert!(debug.starts_with(tmp.path().join("dev_data").join("debug")));
    }
}
