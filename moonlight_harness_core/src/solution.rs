use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the solution file the solver writes when no run name is given.
pub const DEFAULT_SOLUTION_FILE: &str = "moonlight_solution.json";

/// Returns the solution file name for a solver run named `run_name`.
pub fn solution_file_name(run_name: Option<&str>) -> String {
    match run_name {
        Some(name) => format!("{name}_solution.json"),
        None => DEFAULT_SOLUTION_FILE.to_string(),
    }
}

#[derive(Error, Debug)]
pub enum SolutionError {
    #[error("Solution file {0:?} does not exist")]
    Missing(PathBuf),
    #[error("Failed to read solution file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed solution in {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The six metrics that describe a corpus-minimization result.
///
/// Both sides of a verification use this type: the solver's output file and
/// the expected values from a fixture or benchmark results file. Each field
/// is coerced to its declared type while parsing, so the solver's habit of
/// writing numbers as JSON strings (`"corpus_size": "2"`) is absorbed here
/// rather than at comparison time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
pub struct SolutionRecord {
    #[serde(deserialize_with = "count")]
    pub corpus_size: u64,
    #[serde(deserialize_with = "count")]
    pub solution_size: u64,
    #[serde(deserialize_with = "weight")]
    pub solution_weight: f64,
    #[serde(deserialize_with = "count")]
    pub initial_singularities: u64,
    #[serde(deserialize_with = "count")]
    pub num_basic_blocks: u64,
    #[serde(deserialize_with = "names")]
    pub solution: BTreeSet<String>,
}

/// Informational fields the solver adds next to the compared metrics.
/// They are surfaced in logs and never compared.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SolverAnnotations {
    #[serde(default)]
    pub corpus: Option<String>,
    #[serde(default, deserialize_with = "optional_count")]
    pub num_non_optimal: Option<u64>,
    #[serde(default, deserialize_with = "optional_weight")]
    pub weight_non_optimal: Option<f64>,
    #[serde(default)]
    pub score_label: Option<String>,
}

/// A parsed `*_solution.json` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolutionFile {
    #[serde(flatten)]
    pub record: SolutionRecord,
    #[serde(flatten)]
    pub annotations: SolverAnnotations,
}

impl SolutionFile {
    pub fn from_json(path: &Path, content: &str) -> Result<Self, SolutionError> {
        serde_json::from_str(content).map_err(|source| SolutionError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SolutionError> {
        if !path.is_file() {
            return Err(SolutionError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| SolutionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &content)
    }
}

impl SolutionRecord {
    /// Loads an expected record, e.g. a benchmark results file.
    pub fn load(path: &Path) -> Result<Self, SolutionError> {
        SolutionFile::load(path).map(|file| file.record)
    }
}

struct CountVisitor;

impl<'de> Visitor<'de> for CountVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer, or a string holding one")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        if v.fract() == 0.0 && v >= 0.0 && v <= u64::MAX as f64 {
            Ok(v as u64)
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.trim()
            .parse::<u64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

struct WeightVisitor;

impl<'de> Visitor<'de> for WeightVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, or a string holding one")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        v.trim()
            .parse::<f64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

struct NamesVisitor;

impl<'de> Visitor<'de> for NamesVisitor {
    type Value = BTreeSet<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of exemplar names")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut names = BTreeSet::new();
        while let Some(name) = seq.next_element::<String>()? {
            names.insert(name);
        }
        Ok(names)
    }

    // The solver's JSON writer renders an empty array as "".
    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if v.is_empty() {
            Ok(BTreeSet::new())
        } else {
            Err(E::invalid_type(de::Unexpected::Str(v), &self))
        }
    }
}

pub(crate) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserializer.deserialize_any(CountVisitor)
}

pub(crate) fn weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    deserializer.deserialize_any(WeightVisitor)
}

pub(crate) fn names<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeSet<String>, D::Error> {
    deserializer.deserialize_any(NamesVisitor)
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    count(deserializer).map(Some)
}

fn optional_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    weight(deserializer).map(Some)
}
