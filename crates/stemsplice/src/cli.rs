//! Command line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use stemsplice_core::config::{AppConfig, OutputModeKind};
use stemsplice_core::jobs::BatchMode;
use stemsplice_core::reconcile::Disposition;
use stemsplice_core::stems::ModelType;
use stemsplice_core::TimeRange;

/// stemsplice - separate timeline selections into stems
///
/// Renders the selected material, runs the separation worker on every span
/// and writes the stems back into the project as one undoable edit.
#[derive(Parser, Debug)]
#[command(name = "stemsplice")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Separate a selection of a project into stems
    Separate(SeparateArgs),
    /// Check that the separation worker is installed and runnable
    Check,
    /// List the available separation models
    Models,
    /// List the compute devices the worker can use
    Devices,
    /// Print the effective configuration as YAML
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
pub struct SeparateArgs {
    /// Project file (JSON timeline)
    #[arg(short, long, value_name = "FILE")]
    pub project: PathBuf,

    /// Write the result here instead of overwriting the project
    #[arg(long, value_name = "FILE")]
    pub save_as: Option<PathBuf>,

    /// Time range in seconds, START:END
    #[arg(short, long, value_name = "START:END")]
    pub range: Option<TimeRange>,

    /// Item ids to separate
    #[arg(short, long, value_name = "ID", value_delimiter = ',')]
    pub items: Vec<u64>,

    /// Track ids to separate
    #[arg(short, long, value_name = "ID", value_delimiter = ',')]
    pub tracks: Vec<u64>,

    /// Run jobs one at a time or all at once
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Where the stems go
    #[arg(short, long, value_enum)]
    pub output: Option<OutputArg>,

    /// Group new stem tracks under a folder track
    #[arg(long)]
    pub folder: bool,

    /// What happens to the original material (new-tracks output only)
    #[arg(short, long, value_name = "DISPOSITION")]
    pub disposition: Option<Disposition>,

    /// Stems to produce, by name
    #[arg(short, long, value_name = "NAME", value_delimiter = ',')]
    pub stems: Vec<String>,

    /// Separation model id
    #[arg(long, value_name = "ID")]
    pub model: Option<ModelType>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Parallel,
    Sequential,
}

impl From<ModeArg> for BatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Parallel => BatchMode::Parallel,
            ModeArg::Sequential => BatchMode::Sequential,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputArg {
    NewTracks,
    InPlace,
}

impl From<OutputArg> for OutputModeKind {
    fn from(output: OutputArg) -> Self {
        match output {
            OutputArg::NewTracks => OutputModeKind::NewTracks,
            OutputArg::InPlace => OutputModeKind::InPlace,
        }
    }
}

impl SeparateArgs {
    /// Apply the command line overrides on top of the loaded configuration
    ///
    /// Returns the stem names that matched no configured stem.
    pub fn apply_to(&self, config: &mut AppConfig) -> Vec<String> {
        if let Some(mode) = self.mode {
            config.scheduling.mode = mode.into();
        }
        if let Some(output) = self.output {
            config.output.mode = output.into();
        }
        if self.folder {
            config.output.create_folder = true;
        }
        if let Some(disposition) = self.disposition {
            config.output.disposition = disposition;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if self.stems.is_empty() {
            Vec::new()
        } else {
            config.stems.select_only(&self.stems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separate(args: &[&str]) -> SeparateArgs {
        let cli = Cli::try_parse_from(["stemsplice", "separate"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Separate(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_separate_arguments() {
        let args = separate(&[
            "--project",
            "song.json",
            "--range",
            "1.5:4",
            "--items",
            "3,7",
            "--mode",
            "parallel",
            "--output",
            "in-place",
            "--disposition",
            "delete-range",
            "--stems",
            "Vocals,drums",
            "--model",
            "htdemucs_6s",
        ]);
        assert_eq!(args.project, PathBuf::from("song.json"));
        assert_eq!(args.range, TimeRange::new(1.5, 4.0));
        assert_eq!(args.items, vec![3, 7]);
        assert!(args.tracks.is_empty());
        assert_eq!(args.mode, Some(ModeArg::Parallel));
        assert_eq!(args.output, Some(OutputArg::InPlace));
        assert_eq!(args.disposition, Some(Disposition::DeleteRange));
        assert_eq!(args.stems, vec!["Vocals", "drums"]);
        assert_eq!(args.model, Some(ModelType::HtDemucs6s));
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        let result = Cli::try_parse_from(["stemsplice", "separate", "-p", "a.json", "-r", "5:2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = separate(&[
            "-p", "a.json", "--mode", "parallel", "--folder", "--stems", "Bass,Kazoo",
        ]);
        let mut config = AppConfig::default();
        let unknown = args.apply_to(&mut config);

        assert_eq!(unknown, vec!["Kazoo"]);
        assert_eq!(config.scheduling.mode, BatchMode::Parallel);
        assert!(config.output.create_folder);
        assert_eq!(config.stems.snapshot(config.model).names(), vec!["Bass"]);
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["stemsplice", "check", "--config", "custom.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(cli.command, Command::Check));
    }
}
