//! Deterministic stored-file naming.
//!
//! Every stored artifact gets a name derived from its original base name,
//! a minute-resolution timestamp, and a role tag:
//! `<stem>_<YYYYMMDD_HHMM>_<role><ext>`. Because the timestamp only has
//! minute resolution, two artifacts with the same base name stored in the
//! same run would collide; the registry disambiguates them with a numeric
//! suffix before the extension.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

/// Whether a stored file entered the system or was produced by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Input,
    Output,
}

impl FileRole {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Split a file name into stem and extension (extension includes the dot).
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Build the stamped name for a base file name.
pub fn stamped_name(base: &str, role: FileRole, at: DateTime<Utc>) -> String {
    let (stem, ext) = split_name(base);
    format!("{stem}_{}_{}{ext}", at.format("%Y%m%d_%H%M"), role.tag())
}

/// Tracks names handed out during one run so that no two artifacts share a
/// stored name even when their stamped names would be identical.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: Mutex<HashSet<String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique name. The first caller gets the stamped name as-is;
    /// later callers with the same stamped name get `_2`, `_3` and so on
    /// inserted before the extension.
    pub fn reserve(&self, stamped: &str) -> String {
        let mut used = match self.used.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if used.insert(stamped.to_string()) {
            return stamped.to_string();
        }
        let (stem, ext) = split_name(stamped);
        let mut n = 2usize;
        loop {
            let candidate = format!("{stem}_{n}{ext}");
            if used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn stamped_name_keeps_extension() {
        assert_eq!(
            stamped_name("courses.csv", FileRole::Input, at()),
            "courses_20260314_0926_input.csv"
        );
        assert_eq!(
            stamped_name("courses.csv", FileRole::Output, at()),
            "courses_20260314_0926_output.csv"
        );
    }

    #[test]
    fn stamped_name_without_extension() {
        assert_eq!(
            stamped_name("checkpoint", FileRole::Output, at()),
            "checkpoint_20260314_0926_output"
        );
    }

    #[test]
    fn registry_disambiguates_collisions() {
        let registry = NameRegistry::new();
        let stamped = stamped_name("courses.csv", FileRole::Input, at());
        let first = registry.reserve(&stamped);
        let second = registry.reserve(&stamped);
        let third = registry.reserve(&stamped);
        assert_eq!(first, "courses_20260314_0926_input.csv");
        assert_eq!(second, "courses_20260314_0926_input_2.csv");
        assert_eq!(third, "courses_20260314_0926_input_3.csv");
        assert_ne!(first, second);
        assert_ne!(second, third);
    }
}
