//! Worker supervisor
//!
//! Starts one external separation process per job. The process writes
//! progress lines to stdout and diagnostics to stderr; both are redirected
//! into the job directory so the orchestrator can poll them as plain files.
//! Once the process has stopped, for any reason, the supervisor writes the
//! job's `done` marker containing the exit status as text.
//!
//! The worker command line is a template:
//!
//! ```text
//! python3 -u audio_separator_process.py {input} {output_dir} \
//!     --model {model} --device {device}
//! ```
//!
//! Worker contract:
//! - positional `input` and `output_dir`, options `--model` and `--device`;
//!   `--check` and `--list-devices` on their own for diagnostics
//! - chunk size in the `STEMSPLICE_CHUNK_SIZE` environment variable (custom
//!   templates may also pass `{chunk_size}` as an argument)
//! - progress lines `PROGRESS:<0-100>:<stage>` on stdout, diagnostics on stderr
//! - one `<stem key>.<ext>` file per stem in `output_dir`
//!
//! Workers run in the caller's working directory, so a relative script path
//! resolves the same for `separate` as for `check`.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use thiserror::Error;

use crate::jobs::Job;

/// Environment variable carrying the job's chunk size
pub const CHUNK_SIZE_ENV: &str = "STEMSPLICE_CHUNK_SIZE";

/// Errors starting a worker process
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to start worker '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create worker output file {path}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Compute device handed to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComputeDevice {
    /// Let the worker pick the best device
    #[default]
    Auto,
    Cpu,
    /// NVIDIA GPU by index
    Cuda(u32),
    /// DirectML adapter by index (Windows)
    DirectMl(u32),
    /// Apple Metal
    Mps,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(n) => write!(f, "cuda:{}", n),
            Self::DirectMl(n) => write!(f, "directml:{}", n),
            Self::Mps => f.write_str("mps"),
        }
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let indexed = |rest: &str| {
            rest.parse::<u32>()
                .map_err(|_| format!("Invalid device index in '{}'", s))
        };
        match s.split_once(':') {
            None => match s.as_str() {
                "auto" => Ok(Self::Auto),
                "cpu" => Ok(Self::Cpu),
                "mps" => Ok(Self::Mps),
                "cuda" => Ok(Self::Cuda(0)),
                "directml" => Ok(Self::DirectMl(0)),
                _ => Err(format!("Unknown device '{}'", s)),
            },
            Some(("cuda", n)) => indexed(n).map(Self::Cuda),
            Some(("directml", n)) => indexed(n).map(Self::DirectMl),
            Some(_) => Err(format!("Unknown device '{}'", s)),
        }
    }
}

/// Worker program plus argument template
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: String,
    /// Arguments; `{input}`, `{output_dir}`, `{model}`, `{chunk_size}` and
    /// `{device}` are substituted per job. Everything before the first
    /// placeholder is reused for `--check` and `--list-devices`, so the
    /// script path must come first.
    pub args: Vec<String>,
    pub device: ComputeDevice,
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: default_worker_args(),
            device: ComputeDevice::Auto,
        }
    }
}

/// Default argument template for the bundled separator script
pub fn default_worker_args() -> Vec<String> {
    [
        "-u",
        "audio_separator_process.py",
        "{input}",
        "{output_dir}",
        "--model",
        "{model}",
        "--device",
        "{device}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// A fully expanded worker command line for one job
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for WorkerInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running the worker's self-check
#[derive(Debug, Clone)]
pub struct WorkerCheck {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl WorkerCommand {
    /// Expand the argument template for `job`
    pub fn invocation(&self, job: &Job) -> WorkerInvocation {
        let input = job.input_file().to_string_lossy();
        let output_dir = job.output_dir().to_string_lossy();
        let model = job.model().id();
        let chunk_size = job.chunk_size().to_string();
        let device = self.device.to_string();

        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output_dir}", &output_dir)
                    .replace("{model}", model)
                    .replace("{chunk_size}", &chunk_size)
                    .replace("{device}", &device)
            })
            .collect();

        WorkerInvocation {
            program: self.program.clone(),
            args,
        }
    }

    /// Leading arguments that contain no placeholder (interpreter flags,
    /// script path)
    fn base_args(&self) -> Vec<String> {
        self.args
            .iter()
            .take_while(|arg| !arg.contains('{'))
            .cloned()
            .collect()
    }

    /// Run the worker with `--check` and report whether it is usable
    pub fn check_installation(&self) -> Result<WorkerCheck, DispatchError> {
        let output = self.run_base_with("--check")?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        log::info!(
            "check_installation: '{}' exited with {:?}",
            self.program,
            output.status.code()
        );
        Ok(WorkerCheck {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }

    /// Ask the worker which compute devices it can use
    ///
    /// Returns one `device: description` line per device.
    pub fn list_devices(&self) -> Result<Vec<String>, DispatchError> {
        let output = self.run_base_with("--list-devices")?;
        if !output.status.success() {
            log::warn!(
                "list_devices: Worker exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| line.contains(':') && !line.ends_with(':'))
            .map(str::to_string)
            .collect())
    }

    fn run_base_with(&self, flag: &str) -> Result<std::process::Output, DispatchError> {
        Command::new(&self.program)
            .args(self.base_args())
            .arg(flag)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DispatchError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// How a worker process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running worker
pub trait WorkerProcess {
    /// Non-blocking exit check; `Some` once the process has stopped
    fn poll_exit(&mut self) -> io::Result<Option<WorkerExit>>;

    /// Stop the process and write its terminal marker
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts worker processes for jobs
pub trait WorkerLauncher {
    fn launch(&mut self, job: &Job) -> Result<Box<dyn WorkerProcess>, DispatchError>;
}

/// Launches real OS processes from a [`WorkerCommand`]
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    command: WorkerCommand,
}

impl ProcessLauncher {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }
}

fn redirect(path: &Path) -> Result<File, DispatchError> {
    File::create(path).map_err(|source| DispatchError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&mut self, job: &Job) -> Result<Box<dyn WorkerProcess>, DispatchError> {
        let layout = job.layout();
        let invocation = self.command.invocation(job);
        let stdout = redirect(&layout.progress)?;
        let stderr = redirect(&layout.log)?;

        log::info!("ProcessLauncher: Starting {}: {}", job.id(), invocation);
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .env(CHUNK_SIZE_ENV, job.chunk_size().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(Box::new(ChildWorker {
            child,
            done_marker: layout.done_marker.clone(),
            exit: None,
        }))
    }
}

/// An OS child process supervised by the orchestrator
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
    done_marker: PathBuf,
    exit: Option<WorkerExit>,
}

impl ChildWorker {
    fn write_marker(&self, text: &str) -> io::Result<()> {
        std::fs::write(&self.done_marker, format!("{}\n", text))
    }
}

impl WorkerProcess for ChildWorker {
    fn poll_exit(&mut self) -> io::Result<Option<WorkerExit>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let Some(status) = self.child.try_wait()? else {
            return Ok(None);
        };

        let exit = WorkerExit {
            code: status.code(),
        };
        match exit.code {
            Some(code) => self.write_marker(&format!("exit={}", code))?,
            None => self.write_marker("exit=signal")?,
        }
        log::info!(
            "ChildWorker: pid {} exited with {:?}",
            self.child.id(),
            exit.code
        );
        self.exit = Some(exit);
        Ok(self.exit)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        log::warn!("ChildWorker: Terminating pid {}", self.child.id());
        match self.child.kill() {
            Ok(()) => {}
            // Already exited between the last poll and now
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        let status = self.child.wait()?;
        self.exit = Some(WorkerExit {
            code: status.code(),
        });
        self.write_marker("terminated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_job;
    use crate::jobs::JobId;

    #[test]
    fn test_device_parse_and_display() {
        assert_eq!("auto".parse::<ComputeDevice>(), Ok(ComputeDevice::Auto));
        assert_eq!("CUDA:1".parse::<ComputeDevice>(), Ok(ComputeDevice::Cuda(1)));
        assert_eq!("directml".parse::<ComputeDevice>(), Ok(ComputeDevice::DirectMl(0)));
        assert!("cuda:x".parse::<ComputeDevice>().is_err());
        assert!("tpu".parse::<ComputeDevice>().is_err());
        assert_eq!(ComputeDevice::DirectMl(2).to_string(), "directml:2");
    }

    #[test]
    fn test_invocation_expands_placeholders() {
        let job = test_job(Path::new("/work/b1"), 2);
        let command = WorkerCommand {
            device: ComputeDevice::Cuda(0),
            ..Default::default()
        };
        let inv = command.invocation(&job);
        assert_eq!(inv.program, "python3");
        assert_eq!(
            inv.args,
            vec![
                "-u",
                "audio_separator_process.py",
                "/work/b1/job-02/input.wav",
                "/work/b1/job-02/stems",
                "--model",
                "htdemucs",
                "--device",
                "cuda:0",
            ]
        );
        assert_eq!(command.base_args(), vec!["-u", "audio_separator_process.py"]);
    }

    #[test]
    fn test_missing_program_is_dispatch_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path(), 1);
        job.layout().create().unwrap();
        let mut launcher = ProcessLauncher::new(WorkerCommand {
            program: "/nonexistent/stemsplice-worker".to_string(),
            args: vec![],
            device: ComputeDevice::Auto,
        });
        assert!(matches!(
            launcher.launch(&job),
            Err(DispatchError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    fn wait_for_exit(worker: &mut dyn WorkerProcess) -> WorkerExit {
        for _ in 0..500 {
            if let Some(exit) = worker.poll_exit().unwrap() {
                return exit;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("worker did not exit");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_worker_redirects_and_marks_done() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path(), 1);
        job.layout().create().unwrap();

        let mut launcher = ProcessLauncher::new(WorkerCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo PROGRESS:50:Half; echo warning >&2; \
                 echo x > '{output_dir}/vocals.wav'; exit 3"
                    .to_string(),
            ],
            device: ComputeDevice::Auto,
        });
        let mut worker = launcher.launch(&job).unwrap();
        let exit = wait_for_exit(worker.as_mut());

        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
        let layout = job.layout();
        assert_eq!(std::fs::read_to_string(&layout.progress).unwrap(), "PROGRESS:50:Half\n");
        assert_eq!(std::fs::read_to_string(&layout.log).unwrap(), "warning\n");
        assert_eq!(std::fs::read_to_string(&layout.done_marker).unwrap(), "exit=3\n");
        assert!(layout.output_dir.join("vocals.wav").is_file());
        assert_eq!(job.id(), JobId(1));
    }

    /// Script at a path relative to the test's working directory
    #[cfg(unix)]
    fn relative_stub_worker(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::Builder::new()
            .prefix("stub-worker-")
            .tempdir_in(".")
            .unwrap();
        let name = dir.path().file_name().unwrap().to_owned();
        let script = PathBuf::from(name).join("separate.sh");
        std::fs::write(dir.path().join("separate.sh"), body).unwrap();
        (dir, script)
    }

    #[cfg(unix)]
    #[test]
    fn test_default_template_runs_relative_script() {
        let (_scripts, script) = relative_stub_worker(
            "if [ \"$1\" = --check ]; then echo ready; exit 0; fi\n\
             echo \"PROGRESS:100:$4 on $6 chunk $STEMSPLICE_CHUNK_SIZE\"\n\
             cp \"$1\" \"$2/vocals.wav\"\n",
        );
        assert!(script.is_relative());

        let mut args = default_worker_args();
        args[1] = script.to_string_lossy().into_owned();
        args.remove(0);
        let command = WorkerCommand {
            program: "sh".to_string(),
            args,
            device: ComputeDevice::Cpu,
        };
        let check = command.check_installation().unwrap();
        assert!(check.success, "{}", check.output);

        let jobs = tempfile::tempdir().unwrap();
        let job = test_job(jobs.path(), 1);
        job.layout().create().unwrap();
        std::fs::write(job.input_file(), b"RIFF").unwrap();

        let mut launcher = ProcessLauncher::new(command);
        let mut worker = launcher.launch(&job).unwrap();
        let exit = wait_for_exit(worker.as_mut());

        let layout = job.layout();
        let log = std::fs::read_to_string(&layout.log).unwrap();
        assert!(exit.success(), "{}", log);
        assert_eq!(
            std::fs::read_to_string(&layout.progress).unwrap(),
            "PROGRESS:100:htdemucs on cpu chunk 40\n"
        );
        assert!(layout.output_dir.join("vocals.wav").is_file());
        assert_eq!(std::fs::read_to_string(&layout.done_marker).unwrap(), "exit=0\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let job = test_job(dir.path(), 1);
        job.layout().create().unwrap();

        let mut launcher = ProcessLauncher::new(WorkerCommand {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            device: ComputeDevice::Auto,
        });
        let mut worker = launcher.launch(&job).unwrap();
        assert!(worker.poll_exit().unwrap().is_none());
        worker.terminate().unwrap();

        assert!(job.layout().is_marked_done());
        assert_eq!(
            std::fs::read_to_string(&job.layout().done_marker).unwrap(),
            "terminated\n"
        );
        assert!(worker.poll_exit().unwrap().is_some());
    }
}
