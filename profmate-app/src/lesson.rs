//! Lesson material and the tutor's system instruction.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const PERSONA: &str = "You are ProfMate, a friendly, encouraging, and highly intelligent university professor. Answer the student's questions clearly.";

/// A generated lesson, as the lesson view stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<LessonSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSection {
    pub heading: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl LessonContent {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading lesson {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing lesson {}", path.display()))
    }
}

/// Tutor persona, grounded in `lesson` when one is loaded.
pub fn build_system_instruction(lesson: Option<&LessonContent>) -> String {
    let mut instruction = PERSONA.to_string();
    let Some(lesson) = lesson else {
        return instruction;
    };

    let headings: Vec<&str> = lesson.sections.iter().map(|s| s.heading.as_str()).collect();
    let key_points: Vec<String> = lesson
        .sections
        .iter()
        .map(|s| s.key_points.join("; "))
        .collect();

    instruction.push_str(&format!(
        "\n\nCONTEXT:\nThe student has uploaded a lesson titled \"{}\".\n",
        lesson.title
    ));
    instruction.push_str(&format!("Summary: {}\n", lesson.summary));
    instruction.push_str(&format!("Key Sections: {}.\n", headings.join(", ")));
    instruction.push_str(&format!("Key Points: {}.\n", key_points.join(". ")));
    instruction.push_str(
        "Use this context to answer questions specific to the material, but remain helpful for general questions too.",
    );
    instruction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photosynthesis() -> LessonContent {
        serde_json::from_str(
            r#"{
                "title": "Photosynthesis",
                "summary": "How plants turn light into sugar.",
                "sections": [
                    {"heading": "Light reactions", "content": "...", "keyPoints": ["ATP", "NADPH"]},
                    {"heading": "Calvin cycle", "content": "...", "keyPoints": ["Carbon fixation"]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn without_lesson_only_the_persona_is_sent() {
        assert_eq!(build_system_instruction(None), PERSONA);
    }

    #[test]
    fn lesson_context_is_appended_in_order() {
        let text = build_system_instruction(Some(&photosynthesis()));
        let expected = format!(
            "{PERSONA}\n\nCONTEXT:\nThe student has uploaded a lesson titled \"Photosynthesis\".\n\
             Summary: How plants turn light into sugar.\n\
             Key Sections: Light reactions, Calvin cycle.\n\
             Key Points: ATP; NADPH. Carbon fixation.\n\
             Use this context to answer questions specific to the material, but remain helpful for general questions too."
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn lesson_without_sections_still_renders() {
        let lesson = LessonContent {
            title: "Empty".into(),
            summary: "Nothing yet.".into(),
            sections: Vec::new(),
        };
        let text = build_system_instruction(Some(&lesson));
        assert!(text.contains("Key Sections: .\n"));
        assert!(text.contains("Key Points: .\n"));
    }
}
