//! Configuration
//!
//! YAML settings for the separation worker, model, stems, scheduling and
//! output. Every section has defaults, so a missing or partial file is fine.
//!
//! ```ignore
//! use stemsplice_core::config::{default_config_path, AppConfig};
//!
//! let config = AppConfig::load(&default_config_path());
//! let mode = config.output.to_output_mode();
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{default_config_path, default_work_dir};
pub use settings::{AppConfig, OutputConfig, OutputModeKind, SchedulingConfig, WorkerConfig};
