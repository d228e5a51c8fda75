//! Rescue pool for pairs the first pass left unresolved.

use crate::client::{parse_phase2_reply, InferRef};
use crate::models::{ProficiencyTag, SkillContext, TagPair, TagPhase};
use crate::pipeline::prompts::{phase2_user_prompt, PHASE2_SYSTEM_PROMPT};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Pool for the second tagging pass.
///
/// Rescue prompts drop the course framing of the first pass and instead
/// lean on the skill's knowledge base plus the generic reference chart.
/// A pair this pass cannot resolve stays at level 0 for good.
#[derive(Clone)]
pub struct RescuePool {
    backend: InferRef,
    semaphore: Arc<Semaphore>,
}

impl RescuePool {
    pub fn new(backend: InferRef, pool_size: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Re-attempt one unresolved pair.
    pub async fn rescue_one(&self, pair: &TagPair, context: &SkillContext) -> ProficiencyTag {
        let permit = self.semaphore.acquire().await;
        if permit.is_err() {
            return ProficiencyTag::unresolved(
                &pair.course_ref,
                &pair.skill_title,
                "rescue pool shut down",
                TagPhase::Phase2,
                false,
            );
        }

        let user_prompt = phase2_user_prompt(pair, context);
        let content = match self.backend.infer(PHASE2_SYSTEM_PROMPT, &user_prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    course_ref = %pair.course_ref,
                    skill = %pair.skill_title,
                    error = %e,
                    "Rescue inference failed"
                );
                return ProficiencyTag::unresolved(
                    &pair.course_ref,
                    &pair.skill_title,
                    format!("rescue inference failed: {e}"),
                    TagPhase::Phase2,
                    false,
                );
            }
        };

        let reply = match parse_phase2_reply(&content) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    course_ref = %pair.course_ref,
                    skill = %pair.skill_title,
                    error = %e,
                    "Rescue reply unparseable"
                );
                return ProficiencyTag::unresolved(
                    &pair.course_ref,
                    &pair.skill_title,
                    format!("unparseable rescue reply: {e}"),
                    TagPhase::Phase2,
                    false,
                );
            }
        };

        if reply.level != 0 && !context.allows_level(reply.level) {
            debug!(
                course_ref = %pair.course_ref,
                skill = %pair.skill_title,
                level = reply.level,
                "Rescued level not defined for this skill"
            );
            return ProficiencyTag::unresolved(
                &pair.course_ref,
                &pair.skill_title,
                format!(
                    "rescue assigned level {} which is not defined for this skill",
                    reply.level
                ),
                TagPhase::Phase2,
                false,
            );
        }

        ProficiencyTag {
            course_ref: pair.course_ref.clone(),
            skill_title: pair.skill_title.clone(),
            level: reply.level,
            reason: reply.reason,
            confidence: reply.confidence,
            phase: TagPhase::Phase2,
            eligible_for_rescue: false,
            tagged_at: Utc::now(),
        }
    }

    /// Rescue a batch of pairs in parallel. Always returns one tag per pair.
    pub async fn rescue_batch(&self, pairs: Vec<(TagPair, SkillContext)>) -> Vec<ProficiencyTag> {
        let mut handles = Vec::with_capacity(pairs.len());

        for (pair, context) in pairs {
            let pool = self.clone();
            let key = (pair.course_ref.clone(), pair.skill_title.clone());
            let handle = tokio::spawn(async move { pool.rescue_one(&pair, &context).await });
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
                        "unexpected error while rescuing",
                        TagPhase::Phase2,
                        false,
                    ));
                }
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Infer;
    use crate::models::{LevelInfo, Result, SkilltagError};
    use async_trait::async_trait;

    struct FixedBackend(Result<String>);

    #[async_trait]
    impl Infer for FixedBackend {
        async fn infer(&self, _system: &str, _user: &str) -> Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(SkilltagError::Internal(e.to_string())),
            }
        }
    }

    fn pair() -> TagPair {
        TagPair {
            course_ref: "C1".into(),
            skill_title: "Excel".into(),
            course_title: "Sheets".into(),
            about_course: "about".into(),
            what_youll_learn: "learn".into(),
        }
    }

    fn context(levels: &[u8]) -> SkillContext {
        SkillContext {
            skill_title: "Excel".into(),
            levels: levels
                .iter()
                .map(|&level| LevelInfo {
                    level,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rescue_resolves_with_phase2_reply_shape() {
        let backend = Arc::new(FixedBackend(Ok(
            r#"{"proficiency": 2, "reason": "kb match", "confidence": "medium"}"#.into(),
        )));
        let pool = RescuePool::new(backend, 2);
        let tag = pool.rescue_one(&pair(), &context(&[2, 4])).await;
        assert_eq!(tag.level, 2);
        assert_eq!(tag.phase, TagPhase::Phase2);
        assert!(!tag.eligible_for_rescue);
    }

    #[tokio::test]
    async fn failed_rescue_stays_unresolved_for_good() {
        let backend = Arc::new(FixedBackend(Err(SkilltagError::Internal("down".into()))));
        let pool = RescuePool::new(backend, 2);
        let tag = pool.rescue_one(&pair(), &context(&[2])).await;
        assert_eq!(tag.level, 0);
        assert!(!tag.eligible_for_rescue);
    }

    #[tokio::test]
    async fn rescue_respects_defined_levels() {
        let backend = Arc::new(FixedBackend(Ok(
            r#"{"proficiency": 6, "reason": "r", "confidence": "high"}"#.into(),
        )));
        let pool = RescuePool::new(backend, 2);
        let tag = pool.rescue_one(&pair(), &context(&[1, 2])).await;
        assert_eq!(tag.level, 0);
    }
}
