//! Prompt construction for both tagging passes.

use crate::models::{SkillContext, TagPair};
use std::fmt::Write;

/// System prompt for the first tagging pass.
pub const PHASE1_SYSTEM_PROMPT: &str = r#"You are an expert analyst on educational courses and skills.
CONTEXT:
You are given a skill and the description of the course that teaches it. You are also given the proficiency level description, knowledge and abilities requirements for the skill.
Based on the proficiency level description and requirements, associate the skill to one of the proficiency levels, according to how the skill is being taught in the educational course.
GIVEN INFORMATION:
    1. Description of the educational course.
    2. The skill taught through the educational course.
    3. Respective proficiency level description and requirements of the skill.
TASK:
    1. Analyse the given course description.
    2. Analyse how the given skill is taught in the course.
    3. Understand how each of the proficiency levels is defined for the given skill.
    4. Determine which proficiency level the skill should be associated with, according to how it is being taught through the educational course. Keep to only the list of available proficiency levels.
    5. Indicate proficiency level as 0 if the skill cannot be associated to any of the given proficiency levels or when you are unsure.
    6. Provide a reason, in less than 30 words, on how you arrived at your conclusion.
    7. Provide a confidence level of your skills to proficiency level association: low / medium / high. Choose only from these 3 words and do not return anything other than these 3 words.
OUTPUT FORMAT:
Return me ONLY ONE DICTIONARY in the following JSON format:
{
    "proficiency_level": "integer value of the proficiency level",
    "reason": "text string of your reasoning",
    "confidence": "low / medium / high"
}
DO NOT RETURN ANYTHING OTHER THAN THIS JSON. YOUR OUTPUT IS MEANT TO BE PARSED BY ANOTHER COMPUTER PROGRAM."#;

/// System prompt for the rescue pass.
pub const PHASE2_SYSTEM_PROMPT: &str = r#"You are a helpful expert in the area of training courses and skills.
CONTEXT:
    You need to associate the appropriate proficiency levels to skills taught through training courses.
GIVEN INFORMATION:
    Use only these 2 sets of information for the tasks
    1. Knowledge Base that defines the knowledge and abilities associated with each skill at the respective proficiency levels.
    2. Reference Document that defines the performance expectation for skills at different proficiency levels.
TASK:
    1. For each pair of course content and skill taught, identify the most appropriate proficiency level for the skill, using the proficiency level definitions in the Knowledge Base.
    2. Only when you need additional information, refer to the Reference Document for decision.
    3. Only tag a skill with proficiency levels that are found in the Knowledge Base corresponding to it.
    4. When you are unsure, indicate proficiency level as 0.
OUTPUT FORMAT:
Give your response in JSON format like this:
{
    "proficiency": <integer>,
    "reason": "<your reasoning text>",
    "confidence": "high|medium|low"
}
YOUR OUTPUT IS MEANT TO BE PARSED BY ANOTHER COMPUTER PROGRAM."#;

/// One proficiency level in the generic reference chart.
pub struct RacLevel {
    pub level: u8,
    pub responsibility: &'static [&'static str],
    pub autonomy: &'static [&'static str],
    pub complexity: &'static [&'static str],
    pub knowledge_and_ability: &'static [&'static str],
}

/// Generic responsibility / autonomy / complexity expectations per level,
/// used by the rescue pass when the skill's own level definitions were not
/// enough to resolve a tag.
pub const RAC_CHART: [RacLevel; 6] = [
    RacLevel {
        level: 1,
        responsibility: &[
            "Work under direct supervision.",
            "Accountable for tasks assigned.",
        ],
        autonomy: &["Minimal discretion required. Expected to seek guidance."],
        complexity: &["Required to perform mainly routine work."],
        knowledge_and_ability: &[
            "Able to recall factual and procedural knowledge.",
            "Apply basic skills to carry out defined tasks.",
            "Identify opportunities for minor adjustments to work tasks.",
        ],
    },
    RacLevel {
        level: 2,
        responsibility: &[
            "Work with some supervision.",
            "Accountable for a broader set of tasks assigned.",
        ],
        autonomy: &[
            "Use limited discretion in resolving issues or enquiries.",
            "Able to work independently without frequently looking to others for guidance.",
        ],
        complexity: &["Required to perform mainly routine work."],
        knowledge_and_ability: &[
            "Able to understand and apply factual and procedural knowledge in a field of work.",
            "Apply basic cognitive and technical skills to carry out defined tasks and solve routine problems using simple procedures and tools.",
            "Able to present ideas and improve work.",
        ],
    },
    RacLevel {
        level: 3,
        responsibility: &[
            "Work under broad direction.",
            "May hold some accountability for performance of others, in addition to self.",
        ],
        autonomy: &[
            "Use discretion in identifying and responding to issues, work with others and contribute to work performance.",
        ],
        complexity: &["Required to perform less routine, more complex work."],
        knowledge_and_ability: &[
            "Able to apply relevant procedural and conceptual knowledge, and skills to perform differentiated work activities and manage changes.",
            "Able to collaborate with others to identify value-adding opportunities.",
        ],
    },
    RacLevel {
        level: 4,
        responsibility: &[
            "Work under broad direction.",
            "Hold accountability for performance of self and others.",
        ],
        autonomy: &["Exercise judgment; Adapt and influence to achieve work performance."],
        complexity: &["Required to perform less routine, more complex work."],
        knowledge_and_ability: &[
            "Able to evaluate and develop factual and conceptual knowledge within a field of work.",
            "Able to select and apply a range of cognitive and technical skills to solve non-routine, less well-defined or abstract problems.",
            "Able to manage work activities which may be unpredictable.",
            "Facilitate the implementation of innovation.",
        ],
    },
    RacLevel {
        level: 5,
        responsibility: &[
            "Accountable for achieving assigned objectives, decisions made by self and others.",
        ],
        autonomy: &[
            "Provide leadership to achieve desired work results; Manage resources, set milestones and drive work.",
        ],
        complexity: &["Required to perform complex work."],
        knowledge_and_ability: &[
            "Able to evaluate factual and advanced conceptual knowledge within a field of work, involving critical understanding of theories and principles.",
            "Able to select and apply an advanced range of cognitive and technical skills, demonstrating mastery and innovation, to devise solutions to solve complex and unpredictable problems in a specialised field of work.",
            "Able to manage and drive complex work activities.",
        ],
    },
    RacLevel {
        level: 6,
        responsibility: &[
            "Accountable for significant area of work, strategy or overall direction.",
        ],
        autonomy: &[
            "Empower to chart direction and practices within and outside of work (including professional field / community), to achieve / exceed work results.",
        ],
        complexity: &["Required to perform complex work."],
        knowledge_and_ability: &[
            "Able to synthesise knowledge issues in a field of work and be the interface between different fields, in order to create new forms of knowledge.",
            "Employ advanced skills, to solve critical problems and formulate new structures, and/or to redefine existing knowledge or professional practices.",
            "Demonstrate exemplary ability to innovate, and formulate ideas and structures.",
        ],
    },
];

fn push_items(out: &mut String, heading: &str, items: &[&str]) {
    let _ = writeln!(out, "{heading}:");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

/// Render the reference chart for inclusion in rescue prompts.
pub fn format_rac_chart() -> String {
    let mut out = String::new();
    for level in &RAC_CHART {
        let _ = writeln!(out, "Proficiency Level {}:", level.level);
        push_items(&mut out, "Responsibility", level.responsibility);
        push_items(&mut out, "Autonomy", level.autonomy);
        push_items(&mut out, "Complexity", level.complexity);
        push_items(&mut out, "Knowledge and Ability", level.knowledge_and_ability);
        out.push('\n');
    }
    out
}

/// Render a skill's per-level definitions for the first-pass prompt.
pub fn format_skill_context(context: &SkillContext) -> String {
    let mut out = String::new();
    for level in &context.levels {
        let _ = writeln!(out, "Proficiency Level: {}", level.level);
        let _ = writeln!(
            out,
            "Proficiency Description: {}",
            level.proficiency_description
        );
        if !level.knowledge_items.is_empty() {
            out.push_str("Knowledge Items:\n");
            for item in &level.knowledge_items {
                let _ = writeln!(out, "- {item}");
            }
        }
        if !level.ability_items.is_empty() {
            out.push_str("Ability Items:\n");
            for item in &level.ability_items {
                let _ = writeln!(out, "- {item}");
            }
        }
        out.push('\n');
    }
    out
}

/// Render a skill's knowledge base for the rescue prompt: only the
/// knowledge and ability items per level, no course-specific framing.
pub fn format_knowledge_base(context: &SkillContext) -> String {
    let mut out = String::new();
    for level in &context.levels {
        let _ = writeln!(out, "Proficiency Level {}:", level.level);
        for item in level.knowledge_items.iter().chain(&level.ability_items) {
            let _ = writeln!(out, "- {item}");
        }
    }
    out
}

/// First-pass user prompt for one pair.
pub fn phase1_user_prompt(pair: &TagPair, context: &SkillContext) -> String {
    format!(
        "Determine the appropriate proficiency level for skill: \"{}\", \
         based on how it's taught in the following description of a course: {}, \
         Course Description: {} Course Learning Objectives: {}. \
         And how its proficiency levels are defined: {}.",
        pair.skill_title,
        pair.course_title,
        pair.about_course,
        pair.what_youll_learn,
        format_skill_context(context)
    )
}

/// Rescue-pass user prompt for one pair. Carries no course text; the
/// rescue judges the skill against its knowledge base and the generic
/// reference chart alone.
pub fn phase2_user_prompt(pair: &TagPair, context: &SkillContext) -> String {
    format!(
        "What is the most appropriate proficiency level to be tagged to the \
         skill \"{}\", based on the Knowledge Base:\n{}\n\
         Only if you need more info, refer to the Reference Document:\n{}\n\
         Reply in JSON as {{\"proficiency\": <>, \"reason\": <>, \"confidence\": <high|medium|low>}}.",
        pair.skill_title,
        format_knowledge_base(context),
        format_rac_chart()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LevelInfo;

    fn context() -> SkillContext {
        SkillContext {
            skill_title: "Data Analysis".into(),
            category: "Analytics".into(),
            description: "Analyse data.".into(),
            levels: vec![LevelInfo {
                level: 3,
                proficiency_description: "Apply analysis techniques.".into(),
                knowledge_items: vec!["Statistics basics".into()],
                ability_items: vec!["Build dashboards".into()],
            }],
        }
    }

    fn pair() -> TagPair {
        TagPair {
            course_ref: "C1".into(),
            skill_title: "Data Analysis".into(),
            course_title: "Analytics 101".into(),
            about_course: "Intro to analytics.".into(),
            what_youll_learn: "Charts and stats.".into(),
        }
    }

    #[test]
    fn phase1_prompt_carries_course_and_levels() {
        let prompt = phase1_user_prompt(&pair(), &context());
        assert!(prompt.contains("Analytics 101"));
        assert!(prompt.contains("Intro to analytics."));
        assert!(prompt.contains("Proficiency Level: 3"));
        assert!(prompt.contains("Statistics basics"));
        assert!(prompt.contains("Build dashboards"));
    }

    #[test]
    fn phase2_prompt_uses_knowledge_base_and_chart() {
        let prompt = phase2_user_prompt(&pair(), &context());
        assert!(prompt.contains("Knowledge Base"));
        assert!(prompt.contains("Reference Document"));
        assert!(prompt.contains("Statistics basics"));
        // The chart covers all six generic levels
        assert!(prompt.contains("Proficiency Level 6:"));
    }

    #[test]
    fn phase2_prompt_carries_no_course_text() {
        let p = pair();
        let prompt = phase2_user_prompt(&p, &context());
        assert!(prompt.contains(&p.skill_title));
        assert!(!prompt.contains(&p.course_title));
        assert!(!prompt.contains(&p.about_course));
        assert!(!prompt.contains(&p.what_youll_learn));
    }

    #[test]
    fn rac_chart_has_six_ordered_levels() {
        let levels: Vec<u8> = RAC_CHART.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6]);
    }
}
