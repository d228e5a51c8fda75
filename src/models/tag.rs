//! Proficiency tag and output-partition types.

use crate::models::dataset::Dataset;
use crate::models::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest proficiency level in the framework. Level 0 means unresolved.
pub const MAX_PROFICIENCY_LEVEL: u8 = 6;

/// Confidence label attached by the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Parse the service's free-text label; anything unrecognized is Low.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Which pass produced a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPhase {
    /// Course-context pass.
    Phase1,
    /// RAC-chart rescue pass.
    Phase2,
}

/// Proficiency judgment for one (course, skill) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProficiencyTag {
    /// Course reference number from the sector listing.
    pub course_ref: String,
    /// Skill title as it appears in the listing.
    pub skill_title: String,
    /// Assigned level, 0..=6. 0 marks unresolved.
    pub level: u8,
    /// Free-text reasoning from the service, or a failure note.
    pub reason: String,
    pub confidence: Confidence,
    /// Pass that produced this tag.
    pub phase: TagPhase,
    /// False when the pair can never be rescued (e.g. no course text).
    pub eligible_for_rescue: bool,
    pub tagged_at: DateTime<Utc>,
}

impl ProficiencyTag {
    /// Build an unresolved tag with an explanatory reason.
    pub fn unresolved(
        course_ref: &str,
        skill_title: &str,
        reason: impl Into<String>,
        phase: TagPhase,
        eligible_for_rescue: bool,
    ) -> Self {
        Self {
            course_ref: course_ref.to_string(),
            skill_title: skill_title.to_string(),
            level: 0,
            reason: reason.into(),
            confidence: Confidence::Low,
            phase,
            eligible_for_rescue,
            tagged_at: Utc::now(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.level >= 1 && self.level <= MAX_PROFICIENCY_LEVEL
    }

    /// Identity of the pair this tag belongs to.
    pub fn pair_key(&self) -> (String, String) {
        (
            self.course_ref.clone(),
            self.skill_title.to_lowercase().trim().to_string(),
        )
    }
}

/// Final partition of a completed run.
///
/// Valid holds levels 1..=6 from either phase; Invalid holds everything still
/// at 0 after both phases (including missing-text pairs); AllTagged is their
/// union, kept for audit. No pair is ever dropped or duplicated across the
/// two sides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagOutputs {
    pub valid: Vec<ProficiencyTag>,
    pub invalid: Vec<ProficiencyTag>,
}

impl TagOutputs {
    /// Partition a complete tag set.
    pub fn partition(tags: Vec<ProficiencyTag>) -> Self {
        let mut out = Self::default();
        for tag in tags {
            if tag.is_resolved() {
                out.valid.push(tag);
            } else {
                out.invalid.push(tag);
            }
        }
        out
    }

    /// Union of both partitions, valid first.
    pub fn all_tagged(&self) -> Vec<ProficiencyTag> {
        let mut all = self.valid.clone();
        all.extend(self.invalid.iter().cloned());
        all
    }

    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }
}

const TAG_COLUMNS: &[&str] = &[
    "Course Reference Number",
    "Skill Title",
    "Proficiency Level",
    "Reason",
    "Confidence",
    "Phase",
];

/// Render a tag list as a tabular dataset with a header row.
pub fn tags_to_dataset(tags: &[ProficiencyTag]) -> Result<Dataset> {
    let rows = tags
        .iter()
        .map(|t| {
            vec![
                t.course_ref.clone(),
                t.skill_title.clone(),
                t.level.to_string(),
                t.reason.clone(),
                t.confidence.as_str().to_string(),
                match t.phase {
                    TagPhase::Phase1 => "phase_1".to_string(),
                    TagPhase::Phase2 => "phase_2".to_string(),
                },
            ]
        })
        .collect();
    Dataset::new(TAG_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

/// Counters for a completed or resumed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// (course, skill) pairs fed to phase 1, including missing-text pairs.
    pub total_pairs: usize,
    /// Pairs diverted as out-of-sector before phase 1.
    pub out_of_sector: usize,
    /// Pairs skipped in phase 1 for missing course text.
    pub missing_text: usize,
    /// Unresolved pairs sent to the rescue pass.
    pub rescued_attempted: usize,
    /// Pairs the rescue pass resolved.
    pub rescued_resolved: usize,
    pub total_valid: usize,
    pub total_invalid: usize,
    pub runtime_secs: f64,
    /// Valid tags per hour.
    pub throughput_per_hour: f64,
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.total_valid as f64 / self.runtime_secs * 3600.0;
        }
    }
}
