use crate::fixture::TestRecord;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

/// Errors raised while writing a corpus to disk. None of them are retried.
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Weights file name '{0}' collides with an exemplar of the same name")]
    WeightsFileClash(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CorpusError + '_ {
    move |source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A corpus written into its own temporary directory.
///
/// The directory and everything in it, including whatever the solver writes
/// there, is removed when this value is dropped. That happens on every exit
/// path of a test, whether the solver succeeded or not.
#[derive(Debug)]
pub struct MaterializedCorpus {
    dir: TempDir,
    exemplar_count: usize,
    weights_file: Option<PathBuf>,
}

impl MaterializedCorpus {
    /// Writes one file per exemplar and, when the test is weighted, a weights
    /// file named after the test.
    pub fn create(record: &TestRecord) -> Result<Self, CorpusError> {
        let dir = tempfile::Builder::new()
            .prefix("moonlight_corpus_")
            .tempdir()
            .map_err(io_error(&std::env::temp_dir()))?;

        let encoded = record.encoded_corpus();
        let exemplar_count = write_corpus(dir.path(), &encoded)?;

        let weights_file = if record.weighted {
            if encoded.contains_key(&record.name) {
                return Err(CorpusError::WeightsFileClash(record.name.clone()));
            }
            Some(write_weights(dir.path(), &record.name, &record.weights())?)
        } else {
            None
        };

        log::debug!(
            "Materialized {} exemplars for '{}' in {:?}",
            exemplar_count,
            record.name,
            dir.path()
        );

        Ok(Self {
            dir,
            exemplar_count,
            weights_file,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn exemplar_count(&self) -> usize {
        self.exemplar_count
    }

    pub fn weights_file(&self) -> Option<&Path> {
        self.weights_file.as_deref()
    }

    /// Removes the directory now, reporting any error instead of ignoring it
    /// as `Drop` does.
    pub fn close(self) -> Result<(), CorpusError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(io_error(&path))
    }
}

/// Writes each bitmap verbatim into a file named after its exemplar.
/// Returns the number of files written.
pub fn write_corpus(dir: &Path, corpus: &BTreeMap<String, Vec<u8>>) -> Result<usize, CorpusError> {
    for (name, bitmap) in corpus {
        let path = dir.join(name);
        std::fs::write(&path, bitmap).map_err(io_error(&path))?;
    }
    Ok(corpus.len())
}

/// Writes `"<name> <weight>\n"` for each exemplar, in map order.
pub fn write_weights(
    dir: &Path,
    file_name: &str,
    weights: &BTreeMap<String, f64>,
) -> Result<PathBuf, CorpusError> {
    let path = dir.join(file_name);
    let file = File::create(&path).map_err(io_error(&path))?;
    let mut writer = BufWriter::new(file);
    for (name, weight) in weights {
        writeln!(writer, "{name} {weight}").map_err(io_error(&path))?;
    }
    writer.flush().map_err(io_error(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn record(weighted: bool) -> TestRecord {
        let json = format!(
            r#"{{
                "corpus": {{
                    "b": {{"value": "00001111", "weight": 1.5}},
                    "a": {{"value": "1111000011", "weight": 1}},
                    "gone": {{"value": "1", "weight": -1}}
                }},
                "weighted": {weighted},
                "algorithm": "greedy",
                "solution_size": 2,
                "solution_weight": 2.5,
                "initial_singularities": 2,
                "solution": ["a", "b"]
            }}"#
        );
        TestRecord::from_json("weights.json", &json).unwrap()
    }

    #[test]
    fn write_corpus_writes_raw_bitmaps() {
        let dir = tempdir().unwrap();
        let corpus = BTreeMap::from([
            ("x".to_string(), vec![0xff, 0x00]),
            ("y".to_string(), vec![]),
        ]);
        assert_eq!(write_corpus(dir.path(), &corpus).unwrap(), 2);
        assert_eq!(fs::read(dir.path().join("x")).unwrap(), vec![0xff, 0x00]);
        assert!(fs::read(dir.path().join("y")).unwrap().is_empty());
    }

    #[test]
    fn write_weights_one_line_per_exemplar() {
        let dir = tempdir().unwrap();
        let weights = BTreeMap::from([
            ("b".to_string(), 0.5),
            ("a".to_string(), 2.0),
        ]);
        let path = write_weights(dir.path(), "t.json", &weights).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "a 2\nb 0.5\n");
    }

    #[test]
    fn materialize_weighted_test() {
        let corpus = MaterializedCorpus::create(&record(true)).unwrap();
        assert_eq!(corpus.exemplar_count(), 2);
        assert_eq!(fs::read(corpus.path().join("a")).unwrap(), vec![0xf0, 0xc0]);
        assert_eq!(fs::read(corpus.path().join("b")).unwrap(), vec![0x0f, 0x00]);
        assert!(!corpus.path().join("gone").exists());

        let weights_file = corpus.weights_file().unwrap();
        assert_eq!(weights_file, corpus.path().join("weights.json"));
        let weights = fs::read_to_string(weights_file).unwrap();
        assert_eq!(weights, "a 1\nb 1.5\n");
        assert!(!weights.contains("gone"));
    }

    #[test]
    fn materialize_unweighted_test_has_no_weights_file() {
        let corpus = MaterializedCorpus::create(&record(false)).unwrap();
        assert!(corpus.weights_file().is_none());
        assert!(!corpus.path().join("weights.json").exists());
        let entries = fs::read_dir(corpus.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn directory_is_removed_on_drop_and_close() {
        let corpus = MaterializedCorpus::create(&record(true)).unwrap();
        let path = corpus.path().to_path_buf();
        fs::write(path.join("moonlight_solution.json"), "{}").unwrap();
        drop(corpus);
        assert!(!path.exists());

        let corpus = MaterializedCorpus::create(&record(false)).unwrap();
        let path = corpus.path().to_path_buf();
        corpus.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn weights_file_clash_is_an_error() {
        let json = r#"{
            "corpus": {"clash.json": {"value": "1", "weight": 1}},
            "weighted": true, "algorithm": "greedy",
            "solution_size": 1, "solution_weight": 1,
            "initial_singularities": 1, "solution": ["clash.json"]
        }"#;
        let record = TestRecord::from_json("clash.json", json).unwrap();
        assert!(matches!(
            MaterializedCorpus::create(&record),
            Err(CorpusError::WeightsFileClash(_))
        ));
    }

    proptest! {
        #[test]
        fn negative_weight_exemplars_never_reach_disk(
            weights in prop::collection::vec(-2.0f64..2.0, 1..10),
        ) {
            prop_assume!(weights.iter().any(|w| *w >= 0.0));
            let corpus: serde_json::Map<String, serde_json::Value> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("x{i}"), serde_json::json!({ "value": "1", "weight": w })))
                .collect();
            let json = serde_json::json!({
                "corpus": corpus,
                "weighted": true,
                "algorithm": "greedy",
                "solution_size": 0,
                "solution_weight": 0,
                "initial_singularities": 0,
                "solution": []
            });
            let record = TestRecord::from_json("random.json", &json.to_string()).unwrap();
            let materialized = MaterializedCorpus::create(&record).unwrap();

            let on_disk: BTreeSet<String> = fs::read_dir(materialized.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            let weights_text = fs::read_to_string(materialized.weights_file().unwrap()).unwrap();
            let listed: BTreeSet<&str> = weights_text
                .lines()
                .filter_map(|line| line.split(' ').next())
                .collect();

            for (i, w) in weights.iter().enumerate() {
                let name = format!("x{i}");
                prop_assert_eq!(on_disk.contains(&name), *w >= 0.0, "file {}", name);
                prop_assert_eq!(listed.contains(name.as_str()), *w >= 0.0, "weight line {}", name);
            }
            prop_assert!(on_disk.contains("random.json"));
        }
    }
}
