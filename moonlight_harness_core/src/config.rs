use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "moonlight_harness.toml";

/// The benchmarks published alongside the solver.
pub const KNOWN_BENCHMARKS: [&str; 5] = [
    "adobe-pdf",
    "microsoft-word",
    "png",
    "true-type-font",
    "web-html",
];

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub moonlight_path: Option<PathBuf>,
    #[serde(default = "default_unit_tests_dir")]
    pub unit_tests_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_benchmark_results_dir")]
    pub benchmark_results_dir: PathBuf,
    #[serde(default = "default_exemplar_prefix")]
    pub exemplar_prefix: String,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub solver_timeout_ms: Option<u64>,
    #[serde(default = "default_benchmarks")]
    pub benchmarks: Vec<String>,
    #[serde(default = "default_extract_command")]
    pub extract_command: Vec<String>,
}

pub fn default_unit_tests_dir() -> PathBuf {
    PathBuf::from("unit_tests")
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

pub fn default_benchmark_results_dir() -> PathBuf {
    PathBuf::from("benchmark_results")
}

pub fn default_exemplar_prefix() -> String {
    "exemplar_".to_string()
}

pub fn default_benchmarks() -> Vec<String> {
    KNOWN_BENCHMARKS.iter().map(|b| b.to_string()).collect()
}

/// `{archive}` and `{dest}` are substituted per benchmark.
pub fn default_extract_command() -> Vec<String> {
    ["tar", "xJf", "{archive}", "-C", "{dest}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl HarnessConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: HarnessConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Solver command line prefix, or an error if no solver was configured.
    pub fn solver_command(&self) -> Result<Vec<String>, anyhow::Error> {
        let path = self
            .moonlight_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No MoonLight executable configured"))?;
        Ok(vec![path.to_string_lossy().into_owned()])
    }

    pub fn solver_timeout(&self) -> Option<std::time::Duration> {
        self.solver_timeout_ms.map(std::time::Duration::from_millis)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            moonlight_path: None,
            unit_tests_dir: default_unit_tests_dir(),
            data_dir: default_data_dir(),
            benchmark_results_dir: default_benchmark_results_dir(),
            exemplar_prefix: default_exemplar_prefix(),
            run_name: None,
            solver_timeout_ms: None,
            benchmarks: default_benchmarks(),
            extract_command: default_extract_command(),
        }
    }
}
