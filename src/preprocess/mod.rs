//! Sector skill-title normalization.
//!
//! Sector uploads mix two skill-title shapes: a plain name per row, or a
//! `['Python', 'SQL']` list covering several skills at once. Downstream
//! tagging works on one (course, skill) pair per row, so list rows are
//! exploded into one row per skill before the pipeline runs.

use crate::models::{Dataset, Result, SchemaKind, SkilltagError};
use crate::validation::is_list_title;
use tracing::info;

/// Whether a validated sector dataset still contains list-form skill titles.
pub fn needs_preprocessing(dataset: &Dataset) -> bool {
    dataset
        .column_values("Skill Title")
        .map(|mut values| values.any(is_list_title))
        .unwrap_or(false)
}

/// Explode list-form skill titles into one row per skill.
///
/// Plain rows pass through unchanged, so running this on an already
/// normalized dataset returns an identical dataset. Empty list entries are
/// dropped. The result is re-checked against the sector schema; a result
/// that no longer conforms is a pipeline bug and surfaces as a fatal error.
pub fn preprocess(dataset: &Dataset) -> Result<Dataset> {
    let skill_idx = dataset.column_index("Skill Title").ok_or_else(|| {
        SkilltagError::DataValidation("column 'Skill Title' is missing".to_string())
    })?;

    let mut rows = Vec::with_capacity(dataset.row_count());
    let mut exploded = 0usize;
    for row in dataset.rows() {
        let cell = row[skill_idx].trim();
        if !is_list_title(cell) {
            rows.push(row.to_vec());
            continue;
        }
        exploded += 1;
        for skill in parse_list_cell(cell) {
            let mut new_row = row.to_vec();
            new_row[skill_idx] = skill;
            rows.push(new_row);
        }
    }

    let result = Dataset::new(dataset.columns().to_vec(), rows)?;

    let missing = result.missing_columns(SchemaKind::Sector);
    if !missing.is_empty() {
        return Err(SkilltagError::DataValidation(format!(
            "preprocessing produced a malformed dataset, missing columns: {}",
            missing.join(", ")
        )));
    }

    if exploded > 0 {
        info!(
            list_rows = exploded,
            rows_before = dataset.row_count(),
            rows_after = result.row_count(),
            "Exploded list-form skill titles"
        );
    }
    Ok(result)
}

/// Split a `['a', "b"]` cell into its entries, stripping quotes.
fn parse_list_cell(cell: &str) -> Vec<String> {
    let inner = cell
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(|part| part.trim().trim_matches('\'').trim_matches('"').trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
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
    fn plain_rows_pass_through() {
        let ds = sector(vec![vec!["C1", "Excel", "T", "a", "l"]]);
        assert!(!needs_preprocessing(&ds));
        let out = preprocess(&ds).unwrap();
        assert_eq!(out.rows(), ds.rows());
    }

    #[test]
    fn list_rows_explode_with_course_fields_copied() {
        let ds = sector(vec![
            vec!["C1", "['Python', 'SQL']", "Analytics", "about", "learn"],
            vec!["C2", "Excel", "Sheets", "about2", "learn2"],
        ]);
        assert!(needs_preprocessing(&ds));
        let out = preprocess(&ds).unwrap();
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.value(0, "Skill Title"), Some("Python"));
        assert_eq!(out.value(0, "Course Title"), Some("Analytics"));
        assert_eq!(out.value(1, "Skill Title"), Some("SQL"));
        assert_eq!(out.value(1, "About This Course"), Some("about"));
        assert_eq!(out.value(2, "Skill Title"), Some("Excel"));
    }

    #[test]
    fn preprocessing_is_idempotent() {
        let ds = sector(vec![
            vec!["C1", "[\"Python\", \"SQL\"]", "T", "a", "l"],
            vec!["C2", "Excel", "T", "a", "l"],
        ]);
        let once = preprocess(&ds).unwrap();
        assert!(!needs_preprocessing(&once));
        let twice = preprocess(&once).unwrap();
        assert_eq!(once.rows(), twice.rows());
    }

    #[test]
    fn empty_list_entries_are_dropped() {
        let ds = sector(vec![vec!["C1", "['Python', '', 'SQL']", "T", "a", "l"]]);
        let out = preprocess(&ds).unwrap();
        assert_eq!(out.row_count(), 2);
    }
}
