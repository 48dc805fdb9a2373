use crate::fixture::is_plain_file_name;
use crate::solution::{SolutionError, SolutionFile};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Solution(#[from] SolutionError),
    #[error("Solution names {0:?}, which is not a plain file name")]
    InvalidName(String),
    #[error("Failed to create seed directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of copying a solution's exemplars into a seed directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub copied: Vec<String>,
    /// Selected exemplars that were not found in the source directory.
    pub missing: Vec<String>,
}

/// Copies every exemplar named in the solution at `solution_path` from
/// `src_dir` into `dst_dir`, creating `dst_dir` if needed.
///
/// Exemplars absent from `src_dir` are logged and left out. Any failure to
/// write into `dst_dir` ends the copy.
pub fn copy_seeds(
    solution_path: &Path,
    src_dir: &Path,
    dst_dir: &Path,
) -> Result<SeedReport, SeedError> {
    let solution = SolutionFile::load(solution_path)?;
    if let Some(bad) = solution.record.solution.iter().find(|n| !is_plain_file_name(n)) {
        return Err(SeedError::InvalidName(bad.clone()));
    }

    std::fs::create_dir_all(dst_dir).map_err(|source| SeedError::CreateDir {
        path: dst_dir.to_path_buf(),
        source,
    })?;

    let mut report = SeedReport::default();
    for name in &solution.record.solution {
        let from = src_dir.join(name);
        if !from.is_file() {
            log::warn!("Seed {from:?} does not exist, not copying it");
            report.missing.push(name.clone());
            continue;
        }
        let to = dst_dir.join(name);
        std::fs::copy(&from, &to).map_err(|source| SeedError::Copy {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;
        log::debug!("Copied {from:?} to {to:?}");
        report.copied.push(name.clone());
    }

    log::info!(
        "Copied {} of {} selected exemplars into {:?}",
        report.copied.len(),
        solution.record.solution.len(),
        dst_dir
    );
    Ok(report)
}
