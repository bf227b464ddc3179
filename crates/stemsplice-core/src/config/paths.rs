//! Default locations

use std::path::PathBuf;

const APP_DIR: &str = "stemsplice";

/// `<config dir>/stemsplice/config.yaml` (e.g. `~/.config/stemsplice/config.yaml`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// `<cache dir>/stemsplice/jobs`, the root for batch directories
pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("jobs")
}
