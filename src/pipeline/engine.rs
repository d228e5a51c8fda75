//! Two-phase tagging engine.
//!
//! Pipeline flow:
//! Sector pairs → Tagger Pool → Phase-1 tags → Rescue Pool → Final tags → CSV
//!
//! The engine checkpoints after every batch, so a crashed run resumes from
//! the last saved batch instead of re-tagging everything.

use crate::checkpoint::{CheckpointManager, CheckpointState, RunPhase};
use crate::client::InferRef;
use crate::models::{
    tags_to_dataset, Config, Dataset, LevelInfo, ProficiencyTag, Result, RunStats, SkillContext,
    SkilltagError, TagOutputs, TagPair,
};
use crate::pool::{RescuePool, TaggerPool};
use crate::storage::{Bucket, BucketStore, FileRole};
use bytes::Bytes;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Stored names of the artifacts one run produced.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub valid_file: String,
    pub invalid_file: String,
    pub all_file: String,
    pub stats: RunStats,
}

/// Drives both tagging passes over a preprocessed sector dataset.
pub struct TaggingEngine {
    config: Config,
    store: BucketStore,
    checkpoints: CheckpointManager,
    tagger: TaggerPool,
    rescuer: RescuePool,
}

impl TaggingEngine {
    pub fn new(config: Config, store: BucketStore, backend: InferRef) -> Self {
        let pool_size = config.pipeline.pool_size;
        Self {
            checkpoints: CheckpointManager::new(store.clone()),
            tagger: TaggerPool::new(Arc::clone(&backend), pool_size),
            rescuer: RescuePool::new(backend, pool_size),
            config,
            store,
        }
    }

    /// Start a fresh run over the given intermediate files.
    pub async fn run(&self, sector_file: &str, sfw_file: &str) -> Result<RunArtifacts> {
        let state = CheckpointState::new(
            Uuid::new_v4().to_string(),
            self.config.pipeline.sector_alias.clone(),
            sector_file.to_string(),
            sfw_file.to_string(),
        );
        self.checkpoints.save(&state).await?;
        self.execute(state).await
    }

    /// Resume the run recorded in the stored checkpoint.
    pub async fn resume(&self) -> Result<RunArtifacts> {
        let state = self.checkpoints.load().await?;
        info!(run_id = %state.run_id, phase = ?state.phase, "Resuming tagging run");
        self.execute(state).await
    }

    async fn load_dataset(&self, name: &str) -> Result<Dataset> {
        let bytes = self.store.get(Bucket::Intermediate, name).await?;
        Dataset::from_csv_bytes(&bytes)
    }

    async fn execute(&self, mut state: CheckpointState) -> Result<RunArtifacts> {
        let start = Instant::now();
        let sector_ds = self.load_dataset(&state.source_file).await?;
        let sfw_ds = self.load_dataset(&state.sfw_file).await?;

        let index = build_skill_index(&sfw_ds, &self.config.pipeline.sector)?;
        if index.is_empty() {
            return Err(SkilltagError::DataValidation(format!(
                "the taxonomy file has no skills for sector '{}'",
                self.config.pipeline.sector
            )));
        }

        let (pairs, out_of_sector) = extract_pairs(&sector_ds, &index)?;
        let mut stats = RunStats {
            total_pairs: pairs.len(),
            out_of_sector: out_of_sector.len(),
            missing_text: pairs.iter().filter(|p| !p.has_course_text()).count(),
            ..Default::default()
        };

        info!(
            run_id = %state.run_id,
            pairs = pairs.len(),
            out_of_sector = out_of_sector.len(),
            skills = index.len(),
            "Tagging run prepared"
        );

        // Out-of-sector rows are split off once, before phase 1 starts. The
        // checkpoint records the write so a resumed run does not repeat it.
        if state.phase == RunPhase::Phase1Running
            && !state.misc_written
            && !out_of_sector.is_empty()
        {
            let misc = pairs_to_dataset(&out_of_sector)?;
            let misc_name = format!("{}_out_of_sector.csv", state.sector_alias);
            let stored = self
                .store
                .store_stamped(
                    Bucket::MiscOutput,
                    &misc_name,
                    FileRole::Output,
                    Bytes::from(misc.to_csv_bytes()?),
                )
                .await?;
            info!(file = %stored, rows = out_of_sector.len(), "Out-of-sector rows written");
            state.misc_written = true;
            self.checkpoints.save(&state).await?;
        }

        if state.phase == RunPhase::Phase1Running {
            self.run_phase1(&mut state, &pairs, &index).await?;
        }

        if matches!(
            state.phase,
            RunPhase::Phase1Complete | RunPhase::Phase2Running
        ) {
            self.run_phase2(&mut state, &pairs, &index, &mut stats)
                .await?;
        }

        let outputs = TagOutputs::partition(state.tags.clone());
        stats.total_valid = outputs.valid.len();
        stats.total_invalid = outputs.invalid.len();

        let alias = state.sector_alias.clone();
        let artifacts = vec![
            (
                format!("{alias}_tagged_valid.csv"),
                Bytes::from(tags_to_dataset(&outputs.valid)?.to_csv_bytes()?),
            ),
            (
                format!("{alias}_unresolved.csv"),
                Bytes::from(tags_to_dataset(&outputs.invalid)?.to_csv_bytes()?),
            ),
            (
                format!("{alias}_tagged_all.csv"),
                Bytes::from(tags_to_dataset(&outputs.all_tagged())?.to_csv_bytes()?),
            ),
        ];
        let stored = self
            .store
            .store_stamped_batch(Bucket::Output, FileRole::Output, artifacts)
            .await?;

        self.checkpoints.invalidate().await?;

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();
        info!(
            run_id = %state.run_id,
            valid = stats.total_valid,
            invalid = stats.total_invalid,
            rescued = stats.rescued_resolved,
            throughput = format!("{:.0}/hr", stats.throughput_per_hour),
            "Tagging run complete"
        );

        let mut names = stored.into_iter();
        let (valid_file, invalid_file, all_file) = match (names.next(), names.next(), names.next())
        {
            (Some(v), Some(i), Some(a)) => (v, i, a),
            _ => {
                return Err(SkilltagError::Internal(
                    "output batch returned fewer names than artifacts".to_string(),
                ))
            }
        };

        Ok(RunArtifacts {
            valid_file,
            invalid_file,
            all_file,
            stats,
        })
    }

    async fn run_phase1(
        &self,
        state: &mut CheckpointState,
        pairs: &[TagPair],
        index: &HashMap<String, SkillContext>,
    ) -> Result<()> {
        // Skip pairs a previous attempt already tagged.
        let done: HashSet<(String, String)> =
            state.tags.iter().map(|t| t.pair_key()).collect();
        let pending: Vec<&TagPair> = pairs
            .iter()
            .filter(|p| !done.contains(&(p.course_ref.clone(), p.skill_key())))
            .collect();

        info!(
            pending = pending.len(),
            already_done = done.len(),
            "Starting first tagging pass"
        );

        let pb = ProgressBar::new(pairs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map_err(|e| SkilltagError::Internal(format!("progress template: {e}")))?
                .progress_chars("##-"),
        );
        pb.set_position(done.len() as u64);

        let batch_size = (self.config.pipeline.pool_size * 2).max(10);
        for chunk in pending.chunks(batch_size) {
            let batch: Vec<(TagPair, SkillContext)> = chunk
                .iter()
                .filter_map(|pair| {
                    index
                        .get(&pair.skill_key())
                        .map(|ctx| ((*pair).clone(), ctx.clone()))
                })
                .collect();

            let tags = self.tagger.tag_batch(batch).await;
            state.tags.extend(tags);
            self.checkpoints.save(state).await?;

            pb.set_position(state.tags.len() as u64);
            let resolved = state.tags.iter().filter(|t| t.is_resolved()).count();
            pb.set_message(format!("resolved: {resolved}"));
        }

        let tags = std::mem::take(&mut state.tags);
        state.complete_phase1(tags);
        self.checkpoints.save(state).await?;
        pb.finish_with_message("first pass done");
        Ok(())
    }

    async fn run_phase2(
        &self,
        state: &mut CheckpointState,
        pairs: &[TagPair],
        index: &HashMap<String, SkillContext>,
        stats: &mut RunStats,
    ) -> Result<()> {
        state.set_phase(RunPhase::Phase2Running);
        self.checkpoints.save(state).await?;

        let candidates = state.rescue_candidates();
        stats.rescued_attempted = candidates.len();
        if candidates.is_empty() {
            info!("No unresolved tags eligible for rescue");
            state.set_phase(RunPhase::Complete);
            self.checkpoints.save(state).await?;
            return Ok(());
        }

        // Map unresolved tags back to their pairs.
        let by_key: HashMap<(String, String), &TagPair> = pairs
            .iter()
            .map(|p| ((p.course_ref.clone(), p.skill_key()), p))
            .collect();

        info!(candidates = candidates.len(), "Starting rescue pass");
        let pb = ProgressBar::new(candidates.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map_err(|e| SkilltagError::Internal(format!("progress template: {e}")))?
                .progress_chars("##-"),
        );

        let batch_size = (self.config.pipeline.pool_size * 2).max(10);
        let mut processed = 0usize;
        for chunk in candidates.chunks(batch_size) {
            let batch: Vec<(TagPair, SkillContext)> = chunk
                .iter()
                .filter_map(|tag| {
                    let pair = by_key.get(&tag.pair_key())?;
                    let ctx = index.get(&pair.skill_key())?;
                    Some(((*pair).clone(), ctx.clone()))
                })
                .collect();

            let rescued = self.rescuer.rescue_batch(batch).await;
            for tag in rescued {
                if tag.is_resolved() {
                    stats.rescued_resolved += 1;
                }
                let key = tag.pair_key();
                match state.tags.iter_mut().find(|t| t.pair_key() == key) {
                    Some(slot) => *slot = tag,
                    None => {
                        warn!(
                            course_ref = %tag.course_ref,
                            skill = %tag.skill_title,
                            "Rescued tag has no phase-1 counterpart"
                        );
                        state.tags.push(tag);
                    }
                }
            }
            processed += chunk.len();
            self.checkpoints.save(state).await?;

            pb.set_position(processed as u64);
            pb.set_message(format!("rescued: {}", stats.rescued_resolved));
        }

        state.set_phase(RunPhase::Complete);
        self.checkpoints.save(state).await?;
        pb.finish_with_message(format!("rescued {}", stats.rescued_resolved));
        Ok(())
    }
}

/// Build the per-skill context index from the taxonomy, restricted to the
/// configured sector.
pub fn build_skill_index(
    sfw: &Dataset,
    sector: &str,
) -> Result<HashMap<String, SkillContext>> {
    let sector_norm = sector.trim().to_lowercase();
    let mut index: HashMap<String, SkillContext> = HashMap::new();

    for row_idx in 0..sfw.row_count() {
        let row_sector = sfw.value(row_idx, "Sector").unwrap_or_default();
        if row_sector.trim().to_lowercase() != sector_norm {
            continue;
        }

        let title = sfw.value(row_idx, "TSC_CCS Title").unwrap_or_default().trim();
        if title.is_empty() {
            continue;
        }
        let level: u8 = match sfw
            .value(row_idx, "Proficiency Level")
            .unwrap_or_default()
            .trim()
            .parse()
        {
            Ok(level) => level,
            Err(_) => continue,
        };

        let key = title.to_lowercase();
        let context = index.entry(key).or_insert_with(|| SkillContext {
            skill_title: title.to_string(),
            category: sfw
                .value(row_idx, "TSC_CCS Category")
                .unwrap_or_default()
                .to_string(),
            description: sfw
                .value(row_idx, "TSC_CCS Description")
                .unwrap_or_default()
                .to_string(),
            levels: Vec::new(),
        });

        if !context.levels.iter().any(|l| l.level == level) {
            context.levels.push(LevelInfo {
                level,
                proficiency_description: sfw
                    .value(row_idx, "Proficiency Description")
                    .unwrap_or_default()
                    .to_string(),
                knowledge_items: Vec::new(),
                ability_items: Vec::new(),
            });
        }

        let item = sfw
            .value(row_idx, "Knowledge / Ability Items")
            .unwrap_or_default()
            .trim()
            .to_string();
        if item.is_empty() {
            continue;
        }
        let classification = sfw
            .value(row_idx, "Knowledge / Ability Classification")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if let Some(level_info) = context.levels.iter_mut().find(|l| l.level == level) {
            let items = match classification.as_str() {
                "knowledge" => &mut level_info.knowledge_items,
                "ability" => &mut level_info.ability_items,
                _ => continue,
            };
            if !items.contains(&item) {
                items.push(item);
            }
        }
    }

    for context in index.values_mut() {
        context.levels.sort_by_key(|l| l.level);
    }
    Ok(index)
}

/// Extract unique (course, skill) pairs from a preprocessed sector dataset
/// and split off pairs whose skill is not in the sector's taxonomy.
pub fn extract_pairs(
    sector: &Dataset,
    index: &HashMap<String, SkillContext>,
) -> Result<(Vec<TagPair>, Vec<TagPair>)> {
    let mut seen = HashSet::new();
    let mut in_sector = Vec::new();
    let mut out_of_sector = Vec::new();

    for row_idx in 0..sector.row_count() {
        let pair = TagPair {
            course_ref: sector
                .value(row_idx, "Course Reference Number")
                .unwrap_or_default()
                .trim()
                .to_string(),
            skill_title: sector
                .value(row_idx, "Skill Title")
                .unwrap_or_default()
                .trim()
                .to_string(),
            course_title: sector
                .value(row_idx, "Course Title")
                .unwrap_or_default()
                .trim()
                .to_string(),
            about_course: sector
                .value(row_idx, "About This Course")
                .unwrap_or_default()
                .to_string(),
            what_youll_learn: sector
                .value(row_idx, "What You'll Learn")
                .unwrap_or_default()
                .to_string(),
        };
        if pair.course_ref.is_empty() || pair.skill_title.is_empty() {
            continue;
        }
        if !seen.insert((pair.course_ref.clone(), pair.skill_key())) {
            continue;
        }
        if index.contains_key(&pair.skill_key()) {
            in_sector.push(pair);
        } else {
            out_of_sector.push(pair);
        }
    }

    Ok((in_sector, out_of_sector))
}

/// Render pairs back to a sector-shaped dataset (for the misc output).
fn pairs_to_dataset(pairs: &[TagPair]) -> Result<Dataset> {
    let columns: Vec<String> = crate::models::SECTOR_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = pairs
        .iter()
        .map(|p| {
            vec![
                p.course_ref.clone(),
                p.skill_title.clone(),
                p.course_title.clone(),
                p.about_course.clone(),
                p.what_youll_learn.clone(),
            ]
        })
        .collect();
    Dataset::new(columns, rows)
}
