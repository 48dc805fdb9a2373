use crate::config::KNOWN_BENCHMARKS;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("{0} is not a valid benchmark")]
    UnknownBenchmark(String),
    #[error("{0:?} is not a valid corpus archive")]
    MissingArchive(PathBuf),
    #[error("No expected results exist for {0}")]
    MissingResults(String),
    #[error("Failed to prepare extraction of {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Extract command is empty")]
    EmptyCommand,
    #[error("Failed to spawn extract command '{command:?}': {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("TAR ERROR: {0}")]
    Extract(String),
    #[error("Archive did not produce a corpus directory at {0:?}")]
    MissingCorpusDir(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BenchmarkError + '_ {
    move |source| BenchmarkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BenchmarkError {
    /// Input errors mean the benchmark is skipped; anything else ends the run.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BenchmarkError::UnknownBenchmark(_)
                | BenchmarkError::MissingArchive(_)
                | BenchmarkError::MissingResults(_)
        )
    }
}

/// A benchmark whose archive and expected results were both found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    pub name: String,
    pub archive: PathBuf,
    pub expected_results: PathBuf,
}

impl Benchmark {
    /// Looks up `<data_dir>/<name>.tar.xz` and `<results_dir>/<name>.json`.
    pub fn resolve(
        name: &str,
        data_dir: &Path,
        results_dir: &Path,
    ) -> Result<Self, BenchmarkError> {
        if !KNOWN_BENCHMARKS.contains(&name) {
            return Err(BenchmarkError::UnknownBenchmark(name.to_string()));
        }
        let archive = data_dir.join(format!("{name}.tar.xz"));
        if !archive.is_file() {
            return Err(BenchmarkError::MissingArchive(archive));
        }
        let expected_results = results_dir.join(format!("{name}.json"));
        if !expected_results.is_file() {
            return Err(BenchmarkError::MissingResults(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            archive,
            expected_results,
        })
    }
}

/// An archive unpacked into a temporary directory, removed on drop.
#[derive(Debug)]
pub struct ExtractedBenchmark {
    dir: TempDir,
    corpus_dir: PathBuf,
}

impl ExtractedBenchmark {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The subdirectory named after the benchmark.
    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }
}

/// Unpacks benchmark archives by running an external command.
///
/// The command is a template: `{archive}` is replaced with the absolute
/// archive path and `{dest}` with the extraction directory. Like the solver,
/// the extractor counts as failed if it writes anything to standard error.
pub struct ArchiveExtractor {
    command: Vec<String>,
}

impl ArchiveExtractor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn extract(&self, benchmark: &Benchmark) -> Result<ExtractedBenchmark, BenchmarkError> {
        let archive =
            std::fs::canonicalize(&benchmark.archive).map_err(io_error(&benchmark.archive))?;
        let dir = tempfile::Builder::new()
            .prefix("moonlight_benchmark_")
            .tempdir()
            .map_err(io_error(&std::env::temp_dir()))?;

        let args: Vec<String> = self
            .command
            .iter()
            .map(|part| {
                part.replace("{archive}", &archive.to_string_lossy())
                    .replace("{dest}", &dir.path().to_string_lossy())
            })
            .collect();
        let (program, rest) = args.split_first().ok_or(BenchmarkError::EmptyCommand)?;

        log::info!("Extracting {:?}...", archive);
        let output = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BenchmarkError::Spawn {
                command: args.clone(),
                source,
            })?;

        if !output.stderr.is_empty() {
            return Err(BenchmarkError::Extract(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let corpus_dir = dir.path().join(&benchmark.name);
        if !corpus_dir.is_dir() {
            return Err(BenchmarkError::MissingCorpusDir(corpus_dir));
        }
        log::info!("Extracted {} into {:?}", benchmark.name, corpus_dir);

        Ok(ExtractedBenchmark { dir, corpus_dir })
    }
}
