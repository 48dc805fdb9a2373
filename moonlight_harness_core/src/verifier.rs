use crate::solution::SolutionRecord;
use std::collections::BTreeSet;
use std::fmt;

/// One of the six metrics compared between a solver result and its expected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolutionField {
    CorpusSize,
    SolutionSize,
    SolutionWeight,
    InitialSingularities,
    NumBasicBlocks,
    Solution,
}

impl SolutionField {
    /// Every compared field, in report order.
    pub const ALL: [SolutionField; 6] = [
        SolutionField::CorpusSize,
        SolutionField::SolutionSize,
        SolutionField::SolutionWeight,
        SolutionField::InitialSingularities,
        SolutionField::NumBasicBlocks,
        SolutionField::Solution,
    ];

    /// The field's key in the solution JSON.
    pub fn name(self) -> &'static str {
        match self {
            SolutionField::CorpusSize => "corpus_size",
            SolutionField::SolutionSize => "solution_size",
            SolutionField::SolutionWeight => "solution_weight",
            SolutionField::InitialSingularities => "initial_singularities",
            SolutionField::NumBasicBlocks => "num_basic_blocks",
            SolutionField::Solution => "solution",
        }
    }

    /// Extracts this field from `record` as a typed value.
    pub fn value_of(self, record: &SolutionRecord) -> FieldValue {
        match self {
            SolutionField::CorpusSize => FieldValue::Count(record.corpus_size),
            SolutionField::SolutionSize => FieldValue::Count(record.solution_size),
            SolutionField::SolutionWeight => FieldValue::Weight(record.solution_weight),
            SolutionField::InitialSingularities => {
                FieldValue::Count(record.initial_singularities)
            }
            SolutionField::NumBasicBlocks => FieldValue::Count(record.num_basic_blocks),
            SolutionField::Solution => FieldValue::Names(record.solution.clone()),
        }
    }
}

impl fmt::Display for SolutionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field value after coercion to its declared type.
///
/// Equality is exact for every variant: counts and weights compare with
/// `==`, and names compare as sets, so order and duplicates in the source
/// JSON never matter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Count(u64),
    Weight(f64),
    Names(BTreeSet<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Count(n) => write!(f, "{n}"),
            // Debug keeps the decimal point, so 2.0 prints as "2.0" not "2".
            FieldValue::Weight(w) => write!(f, "{w:?}"),
            FieldValue::Names(names) => {
                f.write_str("{")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{name}'")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// The (expected, actual) pair for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    pub field: SolutionField,
    pub expected: FieldValue,
    pub actual: FieldValue,
}

impl FieldComparison {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Result of checking a solver result against its expected record.
///
/// Holds a comparison for every field, not just the failing ones, so callers
/// can inspect both sides of a match as well as a mismatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub comparisons: Vec<FieldComparison>,
}

impl CheckOutcome {
    /// True iff every field matched.
    pub fn passed(&self) -> bool {
        self.comparisons.iter().all(FieldComparison::matches)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &FieldComparison> {
        self.comparisons.iter().filter(|c| !c.matches())
    }

    pub fn mismatched_fields(&self) -> Vec<SolutionField> {
        self.mismatches().map(|c| c.field).collect()
    }
}

/// Renders `PASSED`, or `FAILED` followed by one indented
/// `<field>: <expected> v <actual>` line per mismatch.
impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return f.write_str("PASSED");
        }
        f.write_str("FAILED")?;
        for mismatch in self.mismatches() {
            write!(
                f,
                "\n    {}: {} v {}",
                mismatch.field, mismatch.expected, mismatch.actual
            )?;
        }
        Ok(())
    }
}

/// Compares all six fields of `actual` against `expected`.
///
/// Every field is checked even after a mismatch is found, so the outcome
/// names all differences at once.
pub fn check(actual: &SolutionRecord, expected: &SolutionRecord) -> CheckOutcome {
    let comparisons = SolutionField::ALL
        .iter()
        .map(|&field| FieldComparison {
            field,
            expected: field.value_of(expected),
            actual: field.value_of(actual),
        })
        .collect();
    CheckOutcome { comparisons }
}
