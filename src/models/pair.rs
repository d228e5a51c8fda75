//! Tagging units: (course, skill) pairs and the skill context behind them.

use serde::{Deserialize, Serialize};

/// One (course, skill) pair to be tagged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagPair {
    pub course_ref: String,
    pub skill_title: String,
    pub course_title: String,
    pub about_course: String,
    pub what_youll_learn: String,
}

impl TagPair {
    /// A pair with no course text at all cannot be tagged meaningfully.
    pub fn has_course_text(&self) -> bool {
        !self.about_course.trim().is_empty() || !self.what_youll_learn.trim().is_empty()
    }

    /// Combined course text used in rescue prompts.
    pub fn course_text(&self) -> String {
        [
            self.course_title.trim(),
            self.about_course.trim(),
            self.what_youll_learn.trim(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Normalized skill key for lookups and de-duplication.
    pub fn skill_key(&self) -> String {
        self.skill_title.trim().to_lowercase()
    }
}

/// Knowledge and ability items for one proficiency level of a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelInfo {
    pub level: u8,
    pub proficiency_description: String,
    pub knowledge_items: Vec<String>,
    pub ability_items: Vec<String>,
}

/// Everything the taxonomy says about one skill within the sector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillContext {
    pub skill_title: String,
    pub category: String,
    pub description: String,
    /// Levels defined for this skill, ascending. Not every skill defines
    /// all six.
    pub levels: Vec<LevelInfo>,
}

impl SkillContext {
    /// The only levels a tag for this skill may legally carry.
    pub fn allowed_levels(&self) -> Vec<u8> {
        self.levels.iter().map(|l| l.level).collect()
    }

    pub fn allows_level(&self, level: u8) -> bool {
        self.levels.iter().any(|l| l.level == level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_text_detection() {
        let mut pair = TagPair {
            course_ref: "C1".into(),
            skill_title: "Excel".into(),
            course_title: "Sheets".into(),
            about_course: "  ".into(),
            what_youll_learn: "".into(),
        };
        assert!(!pair.has_course_text());
        pair.what_youll_learn = "Formulas".into();
        assert!(pair.has_course_text());
        assert_eq!(pair.course_text(), "Sheets Formulas");
    }

    #[test]
    fn allowed_levels_follow_defined_levels() {
        let ctx = SkillContext {
            skill_title: "Excel".into(),
            levels: vec![
                LevelInfo {
                    level: 2,
                    ..Default::default()
                },
                LevelInfo {
                    level: 3,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(ctx.allowed_levels(), vec![2, 3]);
        assert!(ctx.allows_level(3));
        assert!(!ctx.allows_level(5));
    }
}
