//! First-pass tagging pool.

use crate::client::{parse_phase1_reply, InferRef};
use crate::models::{ProficiencyTag, SkillContext, TagPair, TagPhase};
use crate::pipeline::prompts::{phase1_user_prompt, PHASE1_SYSTEM_PROMPT};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Pool for parallel first-pass tagging.
///
/// A single pair failing, returning garbage, or panicking never fails the
/// batch; it becomes an unresolved tag instead.
#[derive(Clone)]
pub struct TaggerPool {
    backend: InferRef,
    semaphore: Arc<Semaphore>,
}

impl TaggerPool {
    pub fn new(backend: InferRef, pool_size: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Tag a single (course, skill) pair.
    pub async fn tag_one(&self, pair: &TagPair, context: &SkillContext) -> ProficiencyTag {
        // Pairs without any course text carry no signal for the model and
        // are excluded from the rescue pass too.
        if !pair.has_course_text() {
            return ProficiencyTag::unresolved(
                &pair.course_ref,
                &pair.skill_title,
                "course has no descriptive text",
                TagPhase::Phase1,
                false,
            );
        }

        let permit = self.semaphore.acquire().await;
        if permit.is_err() {
            return ProficiencyTag::unresolved(
                &pair.course_ref,
                &pair.skill_title,
                "tagging pool shut down",
                TagPhase::Phase1,
                true,
            );
        }

        let user_prompt = phase1_user_prompt(pair, context);
        let content = match self.backend.infer(PHASE1_SYSTEM_PROMPT, &user_prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    course_ref = %pair.course_ref,
                    skill = %pair.skill_title,
                    error = %e,
                    "First-pass inference failed"
                );
                return ProficiencyTag::unresolved(
                    &pair.course_ref,
                    &pair.skill_title,
                    format!("inference failed: {e}"),
                    TagPhase::Phase1,
                    true,
                );
            }
        };

        let reply = match parse_phase1_reply(&content) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    course_ref = %pair.course_ref,
                    skill = %pair.skill_title,
                    error = %e,
                    "First-pass reply unparseable"
                );
                return ProficiencyTag::unresolved(
                    &pair.course_ref,
                    &pair.skill_title,
                    format!("unparseable reply: {e}"),
                    TagPhase::Phase1,
                    true,
                );
            }
        };

        // A level the skill does not define is not trusted, even when the
        // model sounds confident about it.
        if reply.level != 0 && !context.allows_level(reply.level) {
            debug!(
                course_ref = %pair.course_ref,
                skill = %pair.skill_title,
                level = reply.level,
                "Assigned level not defined for this skill"
            );
            return ProficiencyTag::unresolved(
                &pair.course_ref,
                &pair.skill_title,
                format!(
                    "level {} is not defined for this skill (defined: {:?})",
                    reply.level,
                    context.allowed_levels()
                ),
                TagPhase::Phase1,
                true,
            );
        }

        ProficiencyTag {
            course_ref: pair.course_ref.clone(),
            skill_title: pair.skill_title.clone(),
            level: reply.level,
            reason: reply.reason,
            confidence: reply.confidence,
            phase: TagPhase::Phase1,
            eligible_for_rescue: true,
            tagged_at: Utc::now(),
        }
    }

    /// Tag a batch of pairs in parallel. Always returns one tag per pair.
    pub async fn tag_batch(&self, pairs: Vec<(TagPair, SkillContext)>) -> Vec<ProficiencyTag> {
        let mut handles = Vec::with_capacity(pairs.len());

        for (pair, context) in pairs {
            let pool = self.clone();
            let key = (pair.course_ref.clone(), pair.skill_title.clone());
            let handle = tokio::spawn(async move { pool.tag_one(&pair, &context).await });
            handles.push((key, handle));
        }

        let mut tags = Vec::with_capacity(handles.len());
        for ((course_ref, skill_title), handle) in handles {
            match handle.await {
                Ok(tag) => tags.push(tag),
                Err(e) => {
                    warn!(error = %e, "Task panicked");
                    tags.push(ProficiencyTag::unresolved(
                        &course_ref,
                        &skill_title,
                        "unexpected error while tagging",
                        TagPhase::Phase1,
                        true,
                    ));
                }
            }
        }

        tags
    }
}
