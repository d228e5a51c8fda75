//! Inference client and reply handling.

mod inference;
mod rate_limiter;

pub use inference::{InferenceClient, Message};
pub use rate_limiter::{ModelRateLimitState, RateLimiter, RateLimiterStats};

use crate::models::{Confidence, Result, SkilltagError, MAX_PROFICIENCY_LEVEL};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Seam between the tagging pools and the model backend. The production
/// implementation talks HTTP; tests script replies.
#[async_trait]
pub trait Infer: Send + Sync {
    /// Send one system + user prompt pair and return the raw reply text.
    async fn infer(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[async_trait]
impl Infer for InferenceClient {
    async fn infer(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete(vec![Message::system(system_prompt), Message::user(user_prompt)])
            .await
    }
}

/// A parsed model reply for one (course, skill) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TagReply {
    /// Assigned level; 0 means the model could not resolve the pair.
    pub level: u8,
    pub reason: String,
    pub confidence: Confidence,
}

#[derive(Debug, Deserialize)]
struct Phase1Reply {
    proficiency_level: i64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    confidence: String,
}

#[derive(Debug, Deserialize)]
struct Phase2Reply {
    proficiency: i64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    confidence: String,
}

/// Pull the JSON object out of a reply that may wrap it in markdown fences
/// or surrounding prose.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

/// Levels outside 1..=6 are treated as unresolved rather than trusted.
fn clamp_level(raw: i64) -> u8 {
    if (1..=MAX_PROFICIENCY_LEVEL as i64).contains(&raw) {
        raw as u8
    } else {
        0
    }
}

/// Parse a first-pass reply (`proficiency_level` key).
pub fn parse_phase1_reply(content: &str) -> Result<TagReply> {
    let json = extract_json(content)
        .ok_or_else(|| SkilltagError::Parse(format!("no JSON object in reply: {content}")))?;
    let reply: Phase1Reply = serde_json::from_str(json)
        .map_err(|e| SkilltagError::Parse(format!("malformed first-pass reply: {e}")))?;
    Ok(TagReply {
        level: clamp_level(reply.proficiency_level),
        reason: reply.reason,
        confidence: Confidence::parse(&reply.confidence),
    })
}

/// Parse a rescue-pass reply (`proficiency` key).
pub fn parse_phase2_reply(content: &str) -> Result<TagReply> {
    let json = extract_json(content)
        .ok_or_else(|| SkilltagError::Parse(format!("no JSON object in reply: {content}")))?;
    let reply: Phase2Reply = serde_json::from_str(json)
        .map_err(|e| SkilltagError::Parse(format!("malformed rescue reply: {e}")))?;
    Ok(TagReply {
        level: clamp_level(reply.proficiency),
        reason: reply.reason,
        confidence: Confidence::parse(&reply.confidence),
    })
}

/// Reference-counted inference backend.
pub type InferRef = Arc<dyn Infer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase1_reply_parses_plain_json() {
        let reply = parse_phase1_reply(
            r#"{"proficiency_level": 3, "reason": "matches level 3 tasks", "confidence": "high"}"#,
        )
        .unwrap();
        assert_eq!(reply.level, 3);
        assert_eq!(reply.confidence, Confidence::High);
    }

    #[test]
    fn phase1_reply_parses_fenced_json() {
        let content = "Here is my answer:\n```json\n{\"proficiency_level\": 2, \"reason\": \"r\", \"confidence\": \"medium\"}\n```";
        let reply = parse_phase1_reply(content).unwrap();
        assert_eq!(reply.level, 2);
        assert_eq!(reply.confidence, Confidence::Medium);
    }

    #[test]
    fn out_of_range_level_becomes_unresolved() {
        let reply =
            parse_phase1_reply(r#"{"proficiency_level": 9, "reason": "", "confidence": ""}"#)
                .unwrap();
        assert_eq!(reply.level, 0);
        let reply =
            parse_phase1_reply(r#"{"proficiency_level": -1, "reason": "", "confidence": ""}"#)
                .unwrap();
        assert_eq!(reply.level, 0);
    }

    #[test]
    fn phase2_reply_uses_proficiency_key() {
        let reply =
            parse_phase2_reply(r#"{"proficiency": 4, "reason": "r", "confidence": "low"}"#)
                .unwrap();
        assert_eq!(reply.level, 4);
    }

    #[test]
    fn garbage_reply_is_a_parse_error() {
        assert!(parse_phase1_reply("I cannot answer that.").is_err());
        assert!(parse_phase2_reply("{broken json").is_err());
    }
}
