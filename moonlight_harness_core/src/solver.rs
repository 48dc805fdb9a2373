use crate::fixture::Algorithm;
use crate::solution::{SolutionError, SolutionFile, solution_file_name};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that stop a solver run from producing either a solution or a
/// diagnostic. All of them are fatal for the test being run.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Solver command is empty")]
    EmptyCommand,
    #[error("Failed to spawn solver command '{command:?}': {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("Error waiting for solver: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Solver did not exit within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Solution(#[from] SolutionError),
}

/// Everything the solver needs to know about one run.
///
/// Rendered into `-d <dir> -r <prefix> -i [-g] [-w <weights>] [-n <run name>]`.
#[derive(Debug, Clone)]
pub struct SolverInvocation<'a> {
    pub corpus_dir: &'a Path,
    pub exemplar_prefix: &'a str,
    pub algorithm: Algorithm,
    pub weights_file: Option<&'a Path>,
    pub run_name: Option<&'a str>,
}

impl<'a> SolverInvocation<'a> {
    pub fn new(corpus_dir: &'a Path, exemplar_prefix: &'a str) -> Self {
        Self {
            corpus_dir,
            exemplar_prefix,
            algorithm: Algorithm::Optimal,
            weights_file: None,
            run_name: None,
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-d".into(),
            self.corpus_dir.as_os_str().to_owned(),
            "-r".into(),
            self.exemplar_prefix.into(),
            "-i".into(),
        ];
        if self.algorithm == Algorithm::Greedy {
            args.push("-g".into());
        }
        if let Some(weights) = self.weights_file {
            args.push("-w".into());
            args.push(weights.as_os_str().to_owned());
        }
        if let Some(name) = self.run_name {
            args.push("-n".into());
            args.push(name.into());
        }
        args
    }

    /// Where the solver leaves its result.
    pub fn solution_path(&self) -> PathBuf {
        self.corpus_dir.join(solution_file_name(self.run_name))
    }
}

/// What a completed solver run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverOutcome {
    Solution(SolutionFile),
    /// The solver wrote to standard error. The text is kept verbatim and
    /// the run counts as failed whatever its exit status was.
    Error(String),
}

/// The corpus-minimization engine, seen from the harness.
///
/// A run is synchronous: `run` returns only once the solver has exited and
/// its output streams are drained.
pub trait Solver {
    fn run(&mut self, invocation: &SolverInvocation<'_>) -> Result<SolverOutcome, SolverError>;
}

pub struct CommandSolverConfig {
    /// Solver executable followed by any fixed leading arguments.
    pub command: Vec<String>,
    /// `None` blocks until the solver exits.
    pub timeout: Option<Duration>,
    /// Pass the solver's standard output through to ours instead of discarding it.
    pub inherit_stdout: bool,
}

/// Runs the solver as an external process.
pub struct CommandSolver {
    config: CommandSolverConfig,
}

impl CommandSolver {
    pub fn new(config: CommandSolverConfig) -> Self {
        Self { config }
    }

    /// Waits for the solver and for both of its output streams, all within
    /// `timeout`. A stream still open at the deadline (held by a process the
    /// solver left running) counts as a timeout. Only the solver itself is
    /// killed; processes it spawned are not.
    fn wait_with_timeout(&self, mut child: Child, timeout: Duration) -> Result<Output, SolverError> {
        let stdout_reader = child.stdout.take().map(drain_in_background);
        let stderr_reader = child.stderr.take().map(drain_in_background);
        let deadline = Instant::now() + timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() > deadline {
                        log::error!("Solver timed out after {timeout:?}, killing...");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SolverError::Timeout(timeout));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(SolverError::Wait(e)),
            }
        };

        let stdout = collect_before(stdout_reader, deadline, timeout)?;
        let stderr = collect_before(stderr_reader, deadline, timeout)?;
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut stream: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

fn collect_before(
    reader: Option<Receiver<Vec<u8>>>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>, SolverError> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Timeout) => {
            log::error!("Solver exited but its output was still open after {timeout:?}");
            Err(SolverError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
    }
}

impl Solver for CommandSolver {
    fn run(&mut self, invocation: &SolverInvocation<'_>) -> Result<SolverOutcome, SolverError> {
        let (program, leading_args) = self
            .config
            .command
            .split_first()
            .ok_or(SolverError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        if self.config.inherit_stdout {
            cmd.stdout(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped());
        }

        log::debug!("Running solver: {cmd:?}");

        let child = cmd.spawn().map_err(|source| SolverError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let output = match self.config.timeout {
            Some(timeout) => self.wait_with_timeout(child, timeout)?,
            None => child.wait_with_output().map_err(SolverError::Wait)?,
        };

        if !output.stderr.is_empty() {
            let text = String::from_utf8_lossy(&output.stderr).into_owned();
            log::error!("Solver wrote to standard error ({})", output.status);
            return Ok(SolverOutcome::Error(text));
        }
        if !output.status.success() {
            log::warn!("Solver exited with {} but reported no error", output.status);
        }
        if !output.stdout.is_empty() {
            log::debug!("Solver output:\n{}", String::from_utf8_lossy(&output.stdout));
        }

        let solution = SolutionFile::load(&invocation.solution_path())?;
        Ok(SolverOutcome::Solution(solution))
    }
}
