//! Subcommand implementations

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use thiserror::Error;

use stemsplice_core::config::{default_config_path, save_config, AppConfig};
use stemsplice_core::jobs::BatchRequest;
use stemsplice_core::orchestrator::CancelToken;
use stemsplice_core::pipeline::{run_separation, SeparationOptions, SeparationOutcome};
use stemsplice_core::planner::Selection;
use stemsplice_core::progress::BatchProgress;
use stemsplice_core::render::WavRenderer;
use stemsplice_core::stems::ModelType;
use stemsplice_core::worker::ProcessLauncher;
use stemsplice_core::{ItemId, StemspliceError, TrackId};

use crate::cli::{Cli, Command, SeparateArgs};
use crate::project::{load_project, save_project};

/// Failure of a subcommand
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Separation(#[from] StemspliceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Separation(e) => e.user_message(),
            Self::Other(e) => format!("{:#}", e),
        }
    }
}

pub type CommandResult = Result<(), CommandError>;

pub fn run(cli: Cli) -> CommandResult {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    // An explicitly named config must load; the default one may be absent
    let config = if cli.config.is_some() {
        AppConfig::load_strict(&config_path)?
    } else {
        AppConfig::load(&config_path)
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Separate(args) => separate(config, &args, &mut out),
        Command::Check => check(&config, &mut out),
        Command::Models => models(&config, &mut out),
        Command::Devices => devices(&config, &mut out),
        Command::Config { write } => {
            let write_to = write.then_some(config_path.as_path());
            show_config(&config, write_to, &mut out)
        }
    }
}

pub fn separate(mut config: AppConfig, args: &SeparateArgs, out: &mut impl Write) -> CommandResult {
    let unknown = args.apply_to(&mut config);
    if !unknown.is_empty() {
        let known: Vec<&str> = config.stems.stems().iter().map(|s| s.name.as_str()).collect();
        return Err(anyhow!(
            "Unknown stem(s): {} (known: {})",
            unknown.join(", "),
            known.join(", ")
        )
        .into());
    }

    let mut timeline = load_project(&args.project)?;
    let mut selection = Selection {
        time_range: None,
        items: args.items.iter().copied().map(ItemId).collect(),
        tracks: args.tracks.iter().copied().map(TrackId).collect(),
    };
    if let Some(range) = args.range {
        selection = selection.with_range(range);
    }

    let request = BatchRequest {
        selection,
        mode: config.scheduling.mode,
        stems: &config.stems,
        model: config.model,
        chunk: config.scheduling.chunk_profile(),
        work_dir: config.work_dir(),
    };
    let options = SeparationOptions {
        output: config.output.to_output_mode(),
        timeout: config.scheduling.timeout(),
        poll_interval: config.scheduling.poll_interval(),
        media_dir: config.output.media_dir.clone(),
    };
    let launcher = ProcessLauncher::new(config.worker.to_command());

    let mut last_summary = String::new();
    let outcome = run_separation(
        &mut timeline,
        &WavRenderer::new(),
        launcher,
        &request,
        &options,
        CancelToken::new(),
        |progress: &BatchProgress| {
            let summary = progress.summary();
            if summary != last_summary {
                log::info!("separate: {}", summary);
                last_summary = summary;
            }
        },
    )?;

    let summary = match outcome {
        SeparationOutcome::Completed(summary) => summary,
        SeparationOutcome::Cancelled => {
            writeln!(out, "Separation cancelled, project unchanged")
                .context("Failed to write output")?;
            return Ok(());
        }
    };

    let target: PathBuf = args.save_as.clone().unwrap_or_else(|| args.project.clone());
    save_project(&timeline, &target)?;

    writeln!(out, "{}", summary).context("Failed to write output")?;
    for (label, stem) in &summary.missing {
        writeln!(out, "  missing: {} ({})", stem, label).context("Failed to write output")?;
    }
    for skipped in &summary.skipped {
        writeln!(out, "  skipped: {} ({})", skipped.label, skipped.reason)
            .context("Failed to write output")?;
    }
    writeln!(out, "Saved {:?}", target).context("Failed to write output")?;
    Ok(())
}

pub fn check(config: &AppConfig, out: &mut impl Write) -> CommandResult {
    let command = config.worker.to_command();
    let result = command
        .check_installation()
        .map_err(|e| anyhow!("{}. Is '{}' installed and on PATH?", e, command.program))?;

    write!(out, "{}", result.output).context("Failed to write output")?;
    if !result.success {
        return Err(anyhow!(
            "Worker check failed (exit code {:?}). \
             Install the worker's Python dependencies and retry.",
            result.exit_code
        )
        .into());
    }
    writeln!(out, "Worker OK ({} on {})", command.program, command.device)
        .context("Failed to write output")?;
    Ok(())
}

pub fn models(config: &AppConfig, out: &mut impl Write) -> CommandResult {
    for model in ModelType::all() {
        let marker = if *model == config.model { "*" } else { " " };
        writeln!(
            out,
            "{} {:<12} {:<28} {} stems, {}",
            marker,
            model.id(),
            model.display_name(),
            model.stem_count(),
            model.description()
        )
        .context("Failed to write output")?;
    }
    Ok(())
}

pub fn devices(config: &AppConfig, out: &mut impl Write) -> CommandResult {
    let devices = config
        .worker
        .to_command()
        .list_devices()
        .map_err(anyhow::Error::from)?;
    if devices.is_empty() {
        writeln!(out, "No devices reported, the worker will use the CPU")
            .context("Failed to write output")?;
    }
    for device in devices {
        writeln!(out, "{}", device).context("Failed to write output")?;
    }
    Ok(())
}

pub fn show_config(
    config: &AppConfig,
    write_to: Option<&Path>,
    out: &mut impl Write,
) -> CommandResult {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    write!(out, "{}", yaml).context("Failed to write output")?;
    if let Some(path) = write_to {
        save_config(config, path)?;
        writeln!(out, "# written to {:?}", path).context("Failed to write output")?;
    }
    Ok(())
}
