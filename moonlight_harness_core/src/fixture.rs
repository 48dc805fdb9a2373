use crate::bitmap::{BitString, packed_len};
use crate::solution::{self, SolutionRecord};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read test fixture {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse test fixture '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Test fixture '{0}' has no exemplars with a non-negative weight")]
    EmptyCorpus(String),
    #[error("Test fixture '{test}' has an exemplar name that is not a plain file name: {exemplar:?}")]
    InvalidExemplarName { test: String, exemplar: String },
}

/// Which selection algorithm the solver is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    Greedy,
    #[default]
    Optimal,
}

impl<'de> Deserialize<'de> for Algorithm {
    // Only "greedy" selects the greedy algorithm; any other value means the default.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(if name == "greedy" {
            Algorithm::Greedy
        } else {
            Algorithm::Optimal
        })
    }
}

/// One exemplar as written in a fixture.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Exemplar {
    pub value: BitString,
    #[serde(deserialize_with = "solution::weight")]
    pub weight: f64,
}

#[derive(Deserialize)]
struct RawFixture {
    corpus: BTreeMap<String, Exemplar>,
    weighted: bool,
    #[serde(default)]
    algorithm: Algorithm,
    #[serde(deserialize_with = "solution::count")]
    solution_size: u64,
    #[serde(deserialize_with = "solution::weight")]
    solution_weight: f64,
    #[serde(deserialize_with = "solution::count")]
    initial_singularities: u64,
    #[serde(deserialize_with = "solution::names")]
    solution: BTreeSet<String>,
}

/// A unit test: the corpus handed to the solver and the result expected back.
///
/// Exemplars with a negative weight are dropped while the fixture is parsed.
/// `corpus_size` and `num_basic_blocks` in `expected` are derived from the
/// remaining corpus; whatever the fixture file says for them is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub name: String,
    pub corpus: BTreeMap<String, Exemplar>,
    pub weighted: bool,
    pub algorithm: Algorithm,
    pub expected: SolutionRecord,
}

impl TestRecord {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_json(&name, &content)
    }

    pub fn from_json(name: &str, content: &str) -> Result<Self, FixtureError> {
        let raw: RawFixture = serde_json::from_str(content).map_err(|source| FixtureError::Parse {
            name: name.to_string(),
            source,
        })?;

        let corpus: BTreeMap<String, Exemplar> = raw
            .corpus
            .into_iter()
            .filter(|(_, exemplar)| exemplar.weight >= 0.0)
            .collect();

        if corpus.is_empty() {
            return Err(FixtureError::EmptyCorpus(name.to_string()));
        }
        if let Some(bad) = corpus.keys().find(|n| !is_plain_file_name(n)) {
            return Err(FixtureError::InvalidExemplarName {
                test: name.to_string(),
                exemplar: bad.clone(),
            });
        }

        let num_basic_blocks = corpus
            .values()
            .map(|exemplar| exemplar.value.padded_len())
            .max()
            .unwrap_or(0) as u64;

        let expected = SolutionRecord {
            corpus_size: corpus.len() as u64,
            solution_size: raw.solution_size,
            solution_weight: raw.solution_weight,
            initial_singularities: raw.initial_singularities,
            num_basic_blocks,
            solution: raw.solution,
        };

        Ok(Self {
            name: name.to_string(),
            corpus,
            weighted: raw.weighted,
            algorithm: raw.algorithm,
            expected,
        })
    }

    pub fn num_basic_blocks(&self) -> u64 {
        self.expected.num_basic_blocks
    }

    /// Packs every exemplar to the width of the longest value in the corpus.
    pub fn encoded_corpus(&self) -> BTreeMap<String, Vec<u8>> {
        let width = packed_len(self.num_basic_blocks() as usize);
        self.corpus
            .iter()
            .map(|(name, exemplar)| (name.clone(), exemplar.value.pack_to_width(width)))
            .collect()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.corpus
            .iter()
            .map(|(name, exemplar)| (name.clone(), exemplar.weight))
            .collect()
    }
}

pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    const TWO_HALVES: &str = r#"{
        "corpus": {
            "a": {"value": "11110000", "weight": 1},
            "b": {"value": "00001111", "weight": 1}
        },
        "weighted": false,
        "algorithm": "optimal",
        "corpus_size": 2,
        "solution_size": 2,
        "solution_weight": 2,
        "initial_singularities": 2,
        "solution": ["a", "b"]
    }"#;

    #[test]
    fn parses_fixture_and_derives_sizes() {
        let record = TestRecord::from_json("two_halves.json", TWO_HALVES).unwrap();
        assert_eq!(record.name, "two_halves.json");
        assert!(!record.weighted);
        assert_eq!(record.algorithm, Algorithm::Optimal);
        assert_eq!(record.expected.corpus_size, 2);
        assert_eq!(record.expected.num_basic_blocks, 8);
        assert_eq!(record.expected.solution_weight, 2.0);
    }

    #[test]
    fn algorithm_only_recognizes_greedy() {
        let greedy: Algorithm = serde_json::from_str("\"greedy\"").unwrap();
        let other: Algorithm = serde_json::from_str("\"reduction\"").unwrap();
        assert_eq!(greedy, Algorithm::Greedy);
        assert_eq!(other, Algorithm::Optimal);
    }

    #[test]
    fn negative_weights_are_discarded() {
        let json = r#"{
            "corpus": {
                "keep": {"value": "1", "weight": 0},
                "drop": {"value": "1111111111111111", "weight": -1}
            },
            "weighted": true,
            "algorithm": "greedy",
            "corpus_size": 2,
            "solution_size": 1,
            "solution_weight": 0,
            "initial_singularities": 1,
            "solution": ["keep"]
        }"#;
        let record = TestRecord::from_json("neg.json", json).unwrap();
        assert_eq!(record.corpus.len(), 1);
        assert!(record.corpus.contains_key("keep"));
        assert!(!record.weights().contains_key("drop"));
        // The dropped exemplar no longer contributes to the width either.
        assert_eq!(record.expected.corpus_size, 1);
        assert_eq!(record.expected.num_basic_blocks, 8);
    }

    #[test]
    fn shorter_values_padded_to_longest() {
        let json = r#"{
            "corpus": {
                "long": {"value": "11111111110", "weight": 1},
                "short": {"value": "1", "weight": 1},
                "empty": {"value": "", "weight": 1}
            },
            "weighted": false,
            "algorithm": "greedy",
            "corpus_size": 3,
            "solution_size": 1,
            "solution_weight": 1,
            "initial_singularities": 1,
            "solution": ["long"]
        }"#;
        let record = TestRecord::from_json("pad.json", json).unwrap();
        assert_eq!(record.num_basic_blocks(), 16);
        let encoded = record.encoded_corpus();
        for (name, bytes) in &encoded {
            assert_eq!(bytes.len(), 2, "width of {name}");
        }
        assert_eq!(encoded["long"], vec![0xff, 0xc0]);
        assert_eq!(encoded["short"], vec![0x80, 0x00]);
        assert_eq!(encoded["empty"], vec![0x00, 0x00]);
    }

    #[test]
    fn all_negative_corpus_is_rejected() {
        let json = r#"{
            "corpus": {"a": {"value": "1", "weight": -2}},
            "weighted": true, "algorithm": "greedy",
            "solution_size": 0, "solution_weight": 0,
            "initial_singularities": 0, "solution": []
        }"#;
        assert!(matches!(
            TestRecord::from_json("empty.json", json),
            Err(FixtureError::EmptyCorpus(_))
        ));
    }

    #[test]
    fn path_like_exemplar_names_are_rejected() {
        let json = r#"{
            "corpus": {"../escape": {"value": "1", "weight": 1}},
            "weighted": false, "algorithm": "greedy",
            "solution_size": 1, "solution_weight": 1,
            "initial_singularities": 1, "solution": ["../escape"]
        }"#;
        assert!(matches!(
            TestRecord::from_json("escape.json", json),
            Err(FixtureError::InvalidExemplarName { .. })
        ));
    }

    #[test]
    fn invalid_bits_fail_parsing() {
        let json = TWO_HALVES.replace("11110000", "1111000x");
        assert!(matches!(
            TestRecord::from_json("bad.json", &json),
            Err(FixtureError::Parse { .. })
        ));
    }

    #[test]
    fn load_uses_file_name_as_test_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("halves.json");
        std::fs::write(&path, TWO_HALVES).unwrap();
        let record = TestRecord::load(&path).unwrap();
        assert_eq!(record.name, "halves.json");
    }

    fn fixture_json(values: &[(String, f64)]) -> String {
        let corpus: serde_json::Map<String, serde_json::Value> = values
            .iter()
            .enumerate()
            .map(|(i, (value, weight))| {
                (
                    format!("e{i}"),
                    serde_json::json!({ "value": value, "weight": weight }),
                )
            })
            .collect();
        serde_json::json!({
            "corpus": corpus,
            "weighted": true,
            "algorithm": "greedy",
            "solution_size": 0,
            "solution_weight": 0,
            "initial_singularities": 0,
            "solution": []
        })
        .to_string()
    }

    proptest! {
        #[test]
        fn every_exemplar_is_packed_to_the_longest_width(
            values in prop::collection::vec(("[01]{0,40}", -3.0f64..3.0), 1..12),
        ) {
            let kept: Vec<&(String, f64)> = values.iter().filter(|(_, w)| *w >= 0.0).collect();
            let result = TestRecord::from_json("random.json", &fixture_json(&values));
            if kept.is_empty() {
                prop_assert!(matches!(result, Err(FixtureError::EmptyCorpus(_))));
                return Ok(());
            }

            let record = result.unwrap();
            let longest = kept.iter().map(|(v, _)| v.len()).max().unwrap();
            let width = longest.div_ceil(8);
            prop_assert_eq!(record.expected.corpus_size, kept.len() as u64);
            prop_assert_eq!(record.num_basic_blocks(), (width * 8) as u64);
            for (name, bytes) in record.encoded_corpus() {
                prop_assert_eq!(bytes.len(), width, "width of {}", name);
            }
        }
    }
}
