//! Tabular dataset model shared by validation, preprocessing and tagging.
//!
//! A `Dataset` is an ordered column list plus ordered rows of string cells.
//! Column sets are fixed per `SchemaKind`; datasets are superseded, never
//! mutated in place, once preprocessing has produced a replacement.

use crate::models::{Result, SkilltagError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which canonical schema an uploaded file must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Skills-Framework reference taxonomy.
    Sfw,
    /// Sector course listing with extracted skills.
    Sector,
}

/// Required columns of an SFW upload.
pub const SFW_COLUMNS: &[&str] = &[
    "TSC_CCS_Type",
    "TSC_CCS Code",
    "Sector",
    "TSC_CCS Category",
    "TSC_CCS Title",
    "TSC_CCS Description",
    "Proficiency Level",
    "Proficiency Description",
    "Knowledge / Ability Classification",
    "Knowledge / Ability Items",
];

/// Required columns of a sector course listing.
pub const SECTOR_COLUMNS: &[&str] = &[
    "Course Reference Number",
    "Skill Title",
    "Course Title",
    "About This Course",
    "What You'll Learn",
];

impl SchemaKind {
    /// Required column set for this schema.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Sfw => SFW_COLUMNS,
            Self::Sector => SECTOR_COLUMNS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sfw => "sfw",
            Self::Sector => "sector",
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows hold one string cell per column, in column order. Missing cells in the
/// source are loaded as empty strings; consumers treat empty as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset from a header and rows.
    ///
    /// Rows shorter than the header are padded with empty cells; longer rows
    /// are an error since they cannot be attributed to a column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(SkilltagError::DataValidation(format!(
                    "row {} has {} cells but the header has {} columns",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            row.resize(width, String::new());
            padded.push(row);
        }
        Ok(Self {
            columns,
            rows: padded,
        })
    }

    /// Parse a dataset from delimited bytes with a header row.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| SkilltagError::Parse(format!("reading header row: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| SkilltagError::Parse(format!("reading row {}: {e}", i + 1)))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Self::new(columns, rows)
    }

    /// Serialize to CSV bytes with a header row.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| SkilltagError::Internal(format!("writing header row: {e}")))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| SkilltagError::Internal(format!("writing row: {e}")))?;
        }
        writer
            .into_inner()
            .map_err(|e| SkilltagError::Internal(format!("flushing csv writer: {e}")))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at (row, column name). None if the column does not exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Iterate all values of one column.
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a str>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |r| r[idx].as_str()))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Columns required by `kind` but absent here, sorted for stable messages.
    pub fn missing_columns(&self, kind: SchemaKind) -> Vec<&'static str> {
        let have: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let mut missing: Vec<&'static str> = kind
            .required_columns()
            .iter()
            .copied()
            .filter(|c| !have.contains(c))
            .collect();
        missing.sort_unstable();
        missing
    }

    /// Columns present here but not part of `kind`, sorted.
    pub fn extra_columns(&self, kind: SchemaKind) -> Vec<&str> {
        let expected: HashSet<&str> = kind.required_columns().iter().copied().collect();
        let mut extra: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !expected.contains(c))
            .collect();
        extra.sort_unstable();
        extra
    }
}

/// One failed validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Name of the check that failed, e.g. "Sector File Format Check".
    pub check: String,
    /// Human-readable explanation.
    pub message: String,
}

/// Aggregated outcome of running every check against an upload.
///
/// `is_valid` is true iff `failures` is empty; every check runs regardless of
/// sibling failures, so the failure list is exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub failures: Vec<CheckFailure>,
}

impl ValidationReport {
    pub fn from_failures(failures: Vec<CheckFailure>) -> Self {
        Self {
            is_valid: failures.is_empty(),
            failures,
        }
    }

    /// All failure messages joined as "check: message; check: message".
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.check, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector_dataset() -> Dataset {
        Dataset::new(
            SECTOR_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec![
                vec![
                    "CRS-1".into(),
                    "Python".into(),
                    "Intro to Python".into(),
                    "A beginner course".into(),
                    "Basics of Python".into(),
                ],
                vec![
                    "CRS-2".into(),
                    "SQL".into(),
                    "Databases".into(),
                    "Relational databases".into(),
                    "Queries and joins".into(),
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn csv_round_trip_preserves_cells() {
        let ds = sector_dataset();
        let bytes = ds.to_csv_bytes().unwrap();
        let back = Dataset::from_csv_bytes(&bytes).unwrap();
        assert_eq!(ds, back);
    }

    #[test]
    fn short_rows_are_padded() {
        let ds = Dataset::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec!["1".into()]],
        )
        .unwrap();
        assert_eq!(ds.value(0, "b"), Some(""));
        assert_eq!(ds.value(0, "c"), Some(""));
    }

    #[test]
    fn overlong_rows_are_rejected() {
        let err = Dataset::new(
            vec!["a".into()],
            vec![vec!["1".into(), "2".into()]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 cells"));
    }

    #[test]
    fn missing_and_extra_columns_are_sorted() {
        let ds = Dataset::new(
            vec!["Course Title".into(), "Zebra".into(), "Apple".into()],
            vec![],
        )
        .unwrap();
        let missing = ds.missing_columns(SchemaKind::Sector);
        assert!(missing.contains(&"Skill Title"));
        assert!(missing.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ds.extra_columns(SchemaKind::Sector), vec!["Apple", "Zebra"]);
    }

    #[test]
    fn report_validity_tracks_failures() {
        let ok = ValidationReport::from_failures(vec![]);
        assert!(ok.is_valid);

        let bad = ValidationReport::from_failures(vec![CheckFailure {
            check: "File Size Check".into(),
            message: "file is empty".into(),
        }]);
        assert!(!bad.is_valid);
        assert_eq!(bad.summary(), "File Size Check: file is empty");
    }
}
