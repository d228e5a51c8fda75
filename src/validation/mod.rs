//! Concurrent upload validation.
//!
//! Every check in the schema's check list runs as its own task; a failing
//! or panicking check never prevents the others from completing, so the
//! report always covers the full list.

mod checks;

pub use checks::{is_list_title, is_plain_title, Check};

use crate::models::{CheckFailure, Dataset, SchemaKind, ValidationReport};
use std::sync::Arc;
use tracing::{debug, warn};

/// Run all checks for `kind` against `dataset` and aggregate the outcomes.
pub async fn validate(
    dataset: Arc<Dataset>,
    kind: SchemaKind,
    max_rows: usize,
) -> ValidationReport {
    let checks = Check::list_for(kind, max_rows);
    debug!(
        schema = kind.as_str(),
        rows = dataset.row_count(),
        checks = checks.len(),
        "Starting validation"
    );

    let mut handles = Vec::with_capacity(checks.len());
    for check in checks {
        let dataset = Arc::clone(&dataset);
        handles.push((
            check,
            tokio::spawn(async move { check.run(&dataset) }),
        ));
    }

    let mut failures = Vec::new();
    for (check, handle) in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures.push(CheckFailure {
                    check: check.name().to_string(),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Validation task panicked: {e}");
                failures.push(CheckFailure {
                    check: check.name().to_string(),
                    message: "unexpected error while running this check".to_string(),
                });
            }
        }
    }

    let report = ValidationReport::from_failures(failures);
    debug!(
        schema = kind.as_str(),
        is_valid = report.is_valid,
        failures = report.failures.len(),
        "Validation finished"
    );
    report
}
