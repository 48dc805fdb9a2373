use crate::benchmark::{ArchiveExtractor, Benchmark, BenchmarkError};
use crate::config::HarnessConfig;
use crate::corpus::{CorpusError, MaterializedCorpus};
use crate::fixture::{FixtureError, TestRecord};
use crate::solution::{SolutionError, SolutionFile, SolutionRecord, SolverAnnotations};
use crate::solver::{Solver, SolverError, SolverInvocation, SolverOutcome};
use crate::verifier::{self, CheckOutcome};
use std::io::{Stdout, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything that can stop a test from producing a verdict.
///
/// Input problems (`Fixture`, `ExpectedResults`, and the input variants of
/// `Benchmark`) skip the affected test. Everything else aborts the run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("Failed to load expected results: {0}")]
    ExpectedResults(#[source] SolutionError),
    #[error(transparent)]
    Benchmark(#[from] BenchmarkError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("MOONLIGHT ERROR: {0}")]
    SolverReported(String),
    #[error("Failed to list unit tests in {path:?}: {source}")]
    TestDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

impl HarnessError {
    pub fn is_skippable(&self) -> bool {
        match self {
            HarnessError::Fixture(_) | HarnessError::ExpectedResults(_) => true,
            HarnessError::Benchmark(e) => e.is_input_error(),
            _ => false,
        }
    }
}

/// Verdict for one test that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub outcome: CheckOutcome,
    pub annotations: SolverAnnotations,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTest {
    pub name: String,
    pub reason: String,
}

/// Aggregate of a whole run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<TestReport>,
    pub skipped: Vec<SkippedTest>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.passed()
    }

    /// True iff at least one test ran and every test that ran passed.
    pub fn success(&self) -> bool {
        !self.reports.is_empty() && self.failed() == 0
    }
}

/// Drives tests one at a time: materialize, run the solver, verify.
///
/// Human-readable progress (`Running unit test "x"... PASSED`) goes to the
/// report writer, standard output unless a different writer is supplied.
pub struct Harness<S: Solver, W: Write = Stdout> {
    solver: S,
    config: HarnessConfig,
    out: W,
}

impl<S: Solver> Harness<S, Stdout> {
    pub fn new(solver: S, config: HarnessConfig) -> Self {
        Self::with_writer(solver, config, std::io::stdout())
    }
}

impl<S: Solver, W: Write> Harness<S, W> {
    pub fn with_writer(solver: S, config: HarnessConfig, out: W) -> Self {
        Self {
            solver,
            config,
            out,
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    fn invoke(
        solver: &mut S,
        out: &mut W,
        invocation: &SolverInvocation<'_>,
    ) -> Result<SolutionFile, HarnessError> {
        match solver.run(invocation)? {
            SolverOutcome::Solution(solution) => Ok(solution),
            SolverOutcome::Error(text) => {
                writeln!(out, "MOONLIGHT ERROR: {}", text.trim_end())?;
                Err(HarnessError::SolverReported(text))
            }
        }
    }

    /// Runs a single unit test. The corpus directory is removed before this
    /// returns, whatever the result.
    pub fn run_test(&mut self, record: &TestRecord) -> Result<TestReport, HarnessError> {
        let corpus = MaterializedCorpus::create(record)?;
        let invocation = SolverInvocation {
            algorithm: record.algorithm,
            weights_file: corpus.weights_file(),
            run_name: self.config.run_name.as_deref(),
            ..SolverInvocation::new(corpus.path(), &self.config.exemplar_prefix)
        };
        let solution = Self::invoke(&mut self.solver, &mut self.out, &invocation)?;
        corpus.close()?;

        Ok(TestReport {
            name: record.name.clone(),
            outcome: verifier::check(&solution.record, &record.expected),
            annotations: solution.annotations,
        })
    }

    fn record_report(
        &mut self,
        report: TestReport,
        summary: &mut RunSummary,
    ) -> Result<(), HarnessError> {
        writeln!(self.out, "{}", report.outcome)?;
        if let Some(label) = report
            .annotations
            .score_label
            .as_deref()
            .filter(|l| !l.is_empty())
        {
            log::debug!("'{}' scored with {}", report.name, label);
        }
        summary.reports.push(report);
        Ok(())
    }

    fn record_skip(
        &mut self,
        name: &str,
        err: HarnessError,
        summary: &mut RunSummary,
    ) -> Result<(), HarnessError> {
        if !err.is_skippable() {
            return Err(err);
        }
        log::warn!("Skipping '{name}': {err}");
        writeln!(self.out, "ERROR: {err}. Skipping...")?;
        summary.skipped.push(SkippedTest {
            name: name.to_string(),
            reason: err.to_string(),
        });
        Ok(())
    }

    /// Runs every `*.json` fixture in the configured unit test directory,
    /// in file name order.
    pub fn run_unit_tests(&mut self) -> Result<RunSummary, HarnessError> {
        let mut summary = RunSummary::default();
        for path in discover_unit_tests(&self.config.unit_tests_dir)? {
            let name = file_name(&path);
            write!(self.out, "Running unit test \"{name}\"... ")?;
            self.out.flush()?;

            let result = TestRecord::load(&path)
                .map_err(HarnessError::from)
                .and_then(|record| self.run_test(&record));
            match result {
                Ok(report) => self.record_report(report, &mut summary)?,
                Err(err) => {
                    if err.is_skippable() {
                        writeln!(self.out)?;
                    }
                    self.record_skip(&name, err, &mut summary)?;
                }
            }
        }
        log::info!(
            "Unit tests: {} passed, {} failed, {} skipped",
            summary.passed(),
            summary.failed(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// Runs one benchmark against its published expected results.
    pub fn run_benchmark(
        &mut self,
        name: &str,
        extractor: &ArchiveExtractor,
    ) -> Result<TestReport, HarnessError> {
        let benchmark = Benchmark::resolve(
            name,
            &self.config.data_dir,
            &self.config.benchmark_results_dir,
        )?;
        let expected = SolutionRecord::load(&benchmark.expected_results)
            .map_err(HarnessError::ExpectedResults)?;

        let extracted = extractor.extract(&benchmark)?;
        let invocation = SolverInvocation {
            run_name: self.config.run_name.as_deref(),
            ..SolverInvocation::new(extracted.corpus_dir(), &self.config.exemplar_prefix)
        };
        let solution = Self::invoke(&mut self.solver, &mut self.out, &invocation)?;

        Ok(TestReport {
            name: benchmark.name,
            outcome: verifier::check(&solution.record, &expected),
            annotations: solution.annotations,
        })
    }

    /// Runs the named benchmarks, or the configured list when `names` is empty.
    pub fn run_benchmarks(
        &mut self,
        names: &[String],
        extractor: &ArchiveExtractor,
    ) -> Result<RunSummary, HarnessError> {
        let names: Vec<String> = if names.is_empty() {
            self.config.benchmarks.clone()
        } else {
            names.to_vec()
        };
        writeln!(self.out, "Running benchmarks: {}\n", names.join(", "))?;

        let mut summary = RunSummary::default();
        for name in &names {
            match self.run_benchmark(name, extractor) {
                Ok(report) => {
                    write!(self.out, "Benchmark \"{name}\"... ")?;
                    self.record_report(report, &mut summary)?;
                }
                Err(err) => self.record_skip(name, err, &mut summary)?,
            }
        }
        log::info!(
            "Benchmarks: {} passed, {} failed, {} skipped",
            summary.passed(),
            summary.failed(),
            summary.skipped.len()
        );
        Ok(summary)
    }
}

/// Lists the `*.json` files directly inside `dir`, sorted by name.
pub fn discover_unit_tests(dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    let dir_error = |source| HarnessError::TestDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut tests = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(dir_error)? {
        let path = entry.map_err(dir_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            tests.push(path);
        }
    }
    tests.sort();
    Ok(tests)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
