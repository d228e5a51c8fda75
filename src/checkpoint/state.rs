//! Resumable run state.

use crate::models::ProficiencyTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format version written into every checkpoint. Bumped when the layout
/// changes so stale checkpoints fail loudly instead of resuming wrong.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// First-pass tagging in progress.
    Phase1Running,
    /// First pass finished, rescue pass not started.
    Phase1Complete,
    /// Rescue pass in progress.
    Phase2Running,
    /// Both passes finished.
    Complete,
}

/// Checkpoint state for one tagging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: u32,
    /// Unique id of the run that wrote this checkpoint.
    pub run_id: String,
    /// Sector short name used in artifact names.
    pub sector_alias: String,
    /// Stored name of the preprocessed sector file in the intermediate
    /// bucket, so a resumed run reads the exact same input.
    pub source_file: String,
    /// Stored name of the SFW file in the intermediate bucket.
    pub sfw_file: String,
    pub phase: RunPhase,
    /// Whether the out-of-sector misc artifact has already been written,
    /// so a resumed run does not write a second stamped copy.
    #[serde(default)]
    pub misc_written: bool,
    /// Every tag produced so far, phase 1 results included.
    pub tags: Vec<ProficiencyTag>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(
        run_id: String,
        sector_alias: String,
        source_file: String,
        sfw_file: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            run_id,
            sector_alias,
            source_file,
            sfw_file,
            phase: RunPhase::Phase1Running,
            misc_written: false,
            tags: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Record phase-1 results and advance the phase.
    pub fn complete_phase1(&mut self, tags: Vec<ProficiencyTag>) {
        self.tags = tags;
        self.phase = RunPhase::Phase1Complete;
        self.updated_at = Utc::now();
    }

    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Tags still unresolved and eligible for the rescue pass.
    pub fn rescue_candidates(&self) -> Vec<ProficiencyTag> {
        self.tags
            .iter()
            .filter(|t| !t.is_resolved() && t.eligible_for_rescue)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TagPhase;

    fn tag(course: &str, skill: &str, level: u8, rescue: bool) -> ProficiencyTag {
        let mut t = ProficiencyTag::unresolved(course, skill, "r", TagPhase::Phase1, rescue);
        t.level = level;
        t
    }

    #[test]
    fn rescue_candidates_skip_resolved_and_ineligible() {
        let mut state = CheckpointState::new(
            "run-1".into(),
            "hr".into(),
            "src.csv".into(),
            "sfw.csv".into(),
        );
        state.complete_phase1(vec![
            tag("C1", "Excel", 3, true),
            tag("C1", "Python", 0, true),
            tag("C2", "SQL", 0, false),
        ]);
        assert_eq!(state.phase, RunPhase::Phase1Complete);
        let candidates = state.rescue_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].skill_title, "Python");
    }
}
