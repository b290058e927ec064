use std::path::PathBuf;

// System locations used outside dev mode

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/idverify/idverify.toml")
}

pub fn dev_config_file() -> PathBuf {
    PathBuf::from("configs/idverify.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/idverify/models")
}
