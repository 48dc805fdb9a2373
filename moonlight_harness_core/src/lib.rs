pub mod benchmark;
pub mod bitmap;
pub mod config;
pub mod corpus;
pub mod fixture;
pub mod harness;
pub mod seed;
pub mod solution;
pub mod solver;
pub mod verifier;

pub use benchmark::{ArchiveExtractor, Benchmark, BenchmarkError, ExtractedBenchmark};
pub use bitmap::{BitString, BitmapError, encode};
pub use config::HarnessConfig;
pub use corpus::{CorpusError, MaterializedCorpus};
pub use fixture::{Algorithm, Exemplar, FixtureError, TestRecord};
pub use harness::{Harness, HarnessError, RunSummary, TestReport};
pub use seed::{SeedError, SeedReport, copy_seeds};
pub use solution::{SolutionError, SolutionFile, SolutionRecord, SolverAnnotations};
pub use solver::{
    CommandSolver, CommandSolverConfig, Solver, SolverError, SolverInvocation, SolverOutcome,
};
pub use verifier::{CheckOutcome, FieldComparison, FieldValue, SolutionField, check};
