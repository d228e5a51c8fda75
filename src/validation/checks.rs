//! Individual validation checks.
//!
//! Each check inspects one aspect of an uploaded dataset and either returns
//! normally (pass) or signals a `FileValidation` error carrying the message
//! shown to the user. Checks are independent units of work; the engine in
//! this module's parent runs them concurrently and aggregates the outcomes.

use crate::models::{Dataset, Result, SchemaKind, SkilltagError};
use regex::Regex;
use std::sync::OnceLock;

/// A single named validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Upload must contain at least one data row.
    NonEmpty,
    /// Required columns present, no extras, per-column content constraints.
    SchemaConformance(SchemaKind),
    /// Upload must not exceed the configured row limit.
    SizeBound { max_rows: usize },
    /// Sector skill titles must each be plain text or `['a', 'b']` list form.
    SkillTitleFormat,
}

impl Check {
    /// Display name used in validation reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::NonEmpty => "File Size Check",
            Self::SchemaConformance(SchemaKind::Sfw) => "SFW File Format Check",
            Self::SchemaConformance(SchemaKind::Sector) => "Sector File Format Check",
            Self::SizeBound { .. } => "Row Limit Check",
            Self::SkillTitleFormat => "Skill Title Format Check",
        }
    }

    /// The fixed ordered check list for one schema kind.
    pub fn list_for(kind: SchemaKind, max_rows: usize) -> Vec<Check> {
        match kind {
            SchemaKind::Sfw => vec![
                Check::NonEmpty,
                Check::SchemaConformance(kind),
                Check::SizeBound { max_rows },
            ],
            SchemaKind::Sector => vec![
                Check::NonEmpty,
                Check::SchemaConformance(kind),
                Check::SizeBound { max_rows },
                Check::SkillTitleFormat,
            ],
        }
    }

    /// Run this check against a dataset.
    pub fn run(self, dataset: &Dataset) -> Result<()> {
        match self {
            Self::NonEmpty => check_non_empty(dataset),
            Self::SchemaConformance(kind) => check_schema(dataset, kind),
            Self::SizeBound { max_rows } => check_size(dataset, max_rows),
            Self::SkillTitleFormat => check_skill_title_format(dataset),
        }
    }
}

fn fail(message: impl Into<String>) -> SkilltagError {
    SkilltagError::FileValidation(message.into())
}

fn check_non_empty(dataset: &Dataset) -> Result<()> {
    if dataset.is_empty() {
        return Err(fail(
            "the file has no data rows; add some data and upload it again",
        ));
    }
    Ok(())
}

fn check_size(dataset: &Dataset, max_rows: usize) -> Result<()> {
    if dataset.row_count() > max_rows {
        return Err(fail(format!(
            "the file has {} rows, above the limit of {max_rows}",
            dataset.row_count()
        )));
    }
    Ok(())
}

fn check_schema(dataset: &Dataset, kind: SchemaKind) -> Result<()> {
    let missing = dataset.missing_columns(kind);
    if !missing.is_empty() {
        return Err(fail(format!(
            "missing columns: {}; the file must include all of: {}",
            missing.join(", "),
            kind.required_columns().join(", ")
        )));
    }

    let extra = dataset.extra_columns(kind);
    if !extra.is_empty() {
        return Err(fail(format!(
            "unexpected extra columns: {}; keep only: {}",
            extra.join(", "),
            kind.required_columns().join(", ")
        )));
    }

    match kind {
        SchemaKind::Sfw => check_sfw_content(dataset),
        SchemaKind::Sector => check_sector_content(dataset),
    }
}

/// SFW proficiency levels must be whole numbers.
fn check_sfw_content(dataset: &Dataset) -> Result<()> {
    let values = dataset
        .column_values("Proficiency Level")
        .ok_or_else(|| fail("column 'Proficiency Level' is missing"))?;

    let bad: Vec<String> = values
        .filter(|v| !v.trim().is_empty() && v.trim().parse::<i64>().is_err())
        .map(|v| v.to_string())
        .collect();
    if !bad.is_empty() {
        return Err(fail(format!(
            "column 'Proficiency Level' must contain whole numbers, found: {}",
            bad.join(", ")
        )));
    }
    Ok(())
}

/// Key sector columns cannot be entirely empty.
fn check_sector_content(dataset: &Dataset) -> Result<()> {
    for column in ["Course Reference Number", "Course Title"] {
        let all_empty = dataset
            .column_values(column)
            .ok_or_else(|| fail(format!("column '{column}' is missing")))?
            .all(|v| v.trim().is_empty());
        if all_empty {
            return Err(fail(format!(
                "column '{column}' cannot be completely empty"
            )));
        }
    }
    Ok(())
}

fn plain_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\[\]]+$").unwrap())
}

fn list_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[.*\]$").unwrap())
}

/// True when the cell is a `['Python', 'SQL']`-style list.
pub fn is_list_title(cell: &str) -> bool {
    list_title_re().is_match(cell.trim())
}

/// True when the cell is a plain single-skill title.
pub fn is_plain_title(cell: &str) -> bool {
    plain_title_re().is_match(cell.trim())
}

fn check_skill_title_format(dataset: &Dataset) -> Result<()> {
    let values = dataset
        .column_values("Skill Title")
        .ok_or_else(|| fail("column 'Skill Title' is missing"))?;

    let invalid: Vec<String> = values
        .filter(|v| {
            let v = v.trim();
            !v.is_empty() && !is_plain_title(v) && !is_list_title(v)
        })
        .map(|v| v.to_string())
        .collect();

    if !invalid.is_empty() {
        return Err(fail(format!(
            "unrecognized skill title format: {}; each skill must be a plain name \
             like Excel, or a list like ['Python', 'SQL']",
            invalid.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SECTOR_COLUMNS;

    fn sector(rows: Vec<Vec<&str>>) -> Dataset {
        Dataset::new(
            SECTOR_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|r| r.into_iter().map(String::from).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn empty_dataset_fails_non_empty() {
        let ds = sector(vec![]);
        assert!(Check::NonEmpty.run(&ds).is_err());
    }

    #[test]
    fn missing_column_is_named() {
        let ds = Dataset::new(
            vec!["Course Title".into()],
            vec![vec!["Intro".into()]],
        )
        .unwrap();
        let err = Check::SchemaConformance(SchemaKind::Sector)
            .run(&ds)
            .unwrap_err();
        assert!(err.to_string().contains("Skill Title"));
    }

    #[test]
    fn size_bound_enforced() {
        let ds = sector(vec![
            vec!["C1", "Python", "T", "d", "l"],
            vec!["C2", "SQL", "T", "d", "l"],
        ]);
        assert!(Check::SizeBound { max_rows: 1 }.run(&ds).is_err());
        assert!(Check::SizeBound { max_rows: 2 }.run(&ds).is_ok());
    }

    #[test]
    fn skill_title_formats_recognized() {
        assert!(is_plain_title("Excel"));
        assert!(is_list_title("['Python', 'SQL']"));
        assert!(!is_plain_title("[broken"));
        assert!(!is_list_title("[broken"));

        let ds = sector(vec![vec!["C1", "[broken", "T", "d", "l"]]);
        let err = Check::SkillTitleFormat.run(&ds).unwrap_err();
        assert!(err.to_string().contains("[broken"));
    }

    #[test]
    fn empty_key_column_fails_sector_schema() {
        let ds = sector(vec![vec!["", "Python", "T", "d", "l"]]);
        let err = Check::SchemaConformance(SchemaKind::Sector)
            .run(&ds)
            .unwrap_err();
        assert!(err.to_string().contains("Course Reference Number"));
    }
}
