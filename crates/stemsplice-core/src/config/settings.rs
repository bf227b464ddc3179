//! Application settings
//!
//! ```yaml
//! worker:
//!   program: python3
//!   args: ["-u", "audio_separator_process.py", "{input}", "{output_dir}", ...]
//!   device: auto
//! model: htdemucs
//! scheduling:
//!   mode: sequential
//!   sequential_chunk_size: 40
//! output:
//!   mode: new_tracks
//!   disposition: mute_all
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::io::{load_config, try_load_config};
use super::paths::default_work_dir;
use crate::jobs::{BatchMode, ChunkProfile};
use crate::reconcile::{Disposition, OutputMode};
use crate::stems::{ModelType, StemSettings};
use crate::worker::{default_worker_args, ComputeDevice, WorkerCommand};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    /// Separation model
    pub model: ModelType,
    /// Stem definitions and which of them are selected
    pub stems: StemSettings,
    pub scheduling: SchedulingConfig,
    pub output: OutputConfig,
    /// Root for job directories (defaults to the user cache dir)
    pub work_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load and validate, falling back to defaults on any problem
    pub fn load(path: &Path) -> Self {
        let mut config: Self = load_config(path);
        config.validate();
        config
    }

    /// Load and validate, failing if the file is missing or invalid
    pub fn load_strict(path: &Path) -> anyhow::Result<Self> {
        let mut config: Self = try_load_config(path)?;
        config.validate();
        Ok(config)
    }

    /// Clamp every section to supported values
    pub fn validate(&mut self) {
        self.worker.validate();
        self.scheduling.validate();
        log::debug!(
            "AppConfig::validate: model {}, {} mode, chunk {}, device {}",
            self.model,
            self.scheduling.mode,
            self.scheduling.sequential_chunk_size,
            self.worker.device
        );
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(default_work_dir)
    }
}

/// External worker process settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    /// Argument template, see [`WorkerCommand`]
    pub args: Vec<String>,
    /// `auto`, `cpu`, `cuda:N`, `directml:N` or `mps`
    pub device: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: default_worker_args(),
            device: ComputeDevice::Auto.to_string(),
        }
    }
}

impl WorkerConfig {
    /// Replace an unknown device with `auto`
    pub fn validate(&mut self) {
        match self.device.parse::<ComputeDevice>() {
            Ok(device) => self.device = device.to_string(),
            Err(e) => {
                log::warn!("WorkerConfig::validate: {}, using auto", e);
                self.device = ComputeDevice::Auto.to_string();
            }
        }
    }

    pub fn compute_device(&self) -> ComputeDevice {
        self.device.parse().unwrap_or_default()
    }

    pub fn to_command(&self) -> WorkerCommand {
        WorkerCommand {
            program: self.program.clone(),
            args: self.args.clone(),
            device: self.compute_device(),
        }
    }
}

/// Dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub mode: BatchMode,
    /// Worker chunk size in sequential mode (seconds of audio)
    pub sequential_chunk_size: u32,
    /// Parallel chunk size = sequential chunk size × this ratio
    pub parallel_chunk_ratio: f32,
    pub poll_interval_ms: u64,
    /// Batch time limit measured from the first dispatch
    pub timeout_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            mode: BatchMode::Sequential,
            sequential_chunk_size: 40,
            parallel_chunk_ratio: 0.6,
            poll_interval_ms: 250,
            timeout_secs: 600,
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&mut self) {
        self.sequential_chunk_size = self.sequential_chunk_size.clamp(5, 600);
        self.parallel_chunk_ratio = if self.parallel_chunk_ratio.is_finite() {
            self.parallel_chunk_ratio.clamp(0.1, 1.0)
        } else {
            0.6
        };
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 10_000);
        self.timeout_secs = self.timeout_secs.max(1);
    }

    pub fn chunk_profile(&self) -> ChunkProfile {
        ChunkProfile {
            sequential_chunk_size: self.sequential_chunk_size,
            parallel_ratio: self.parallel_chunk_ratio,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Output mode as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputModeKind {
    #[default]
    NewTracks,
    InPlace,
}

/// Where stems go and what happens to the original
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputModeKind,
    /// Group new stem tracks under a folder track
    pub create_folder: bool,
    /// Treatment of the original material (new tracks mode only)
    pub disposition: Disposition,
    /// Copy stems here before referencing them
    pub media_dir: Option<PathBuf>,
}

impl OutputConfig {
    pub fn to_output_mode(&self) -> OutputMode {
        match self.mode {
            OutputModeKind::NewTracks => OutputMode::NewTracks {
                create_folder: self.create_folder,
                disposition: self.disposition,
            },
            OutputModeKind::InPlace => {
                if self.disposition != Disposition::None {
                    log::warn!(
                        "OutputConfig::to_output_mode: Ignoring disposition {} in in-place mode",
                        self.disposition
                    );
                }
                OutputMode::InPlace
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model, ModelType::HtDemucs);
        assert_eq!(config.scheduling.mode, BatchMode::Sequential);
        assert_eq!(config.scheduling.timeout(), Duration::from_secs(600));
        assert_eq!(config.worker.to_command(), WorkerCommand::default());
        assert_eq!(config.stems.stems().len(), 6);
    }

    #[test]
    fn test_partial_yaml_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r##"
model: htdemucs_6s
worker:
  device: "quantum:3"
scheduling:
  mode: parallel
  sequential_chunk_size: 1000
  parallel_chunk_ratio: 0.01
output:
  mode: in_place
  disposition: mute_all
"##,
        )
        .unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.model, ModelType::HtDemucs6s);
        assert_eq!(config.worker.device, "auto");
        assert_eq!(config.worker.program, "python3");
        assert_eq!(config.scheduling.mode, BatchMode::Parallel);
        assert_eq!(config.scheduling.sequential_chunk_size, 600);
        assert_eq!(config.scheduling.parallel_chunk_ratio, 0.1);
        assert_eq!(config.scheduling.poll_interval_ms, 250);
        assert_eq!(config.output.to_output_mode(), OutputMode::InPlace);
    }

    #[test]
    fn test_stems_section_with_colors() {
        let yaml = r##"
stems:
  - name: Vocals
    file_suffix: vocals.wav
    color: "#FF0000"
  - name: Backing
    file_suffix: no_vocals.wav
    color: "#00ff00"
    selected: false
"##;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let names = config.stems.snapshot(ModelType::HtDemucs).names().join(",");
        assert_eq!(names, "Vocals");
        assert_eq!(config.stems.stems()[1].key(), "no_vocals");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.output.disposition = Disposition::DeleteRange;
        config.worker.device = "cuda:1".to_string();
        crate::config::save_config(&config, &path).unwrap();

        let loaded = AppConfig::load_strict(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.worker.compute_device(), ComputeDevice::Cuda(1));
    }

    #[test]
    fn test_strict_load_requires_file() {
        assert!(AppConfig::load_strict(Path::new("/nonexistent/config.yaml")).is_err());
    }
}
