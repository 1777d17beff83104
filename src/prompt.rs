//! Prompt construction for insight extraction.

use crate::insight::{FieldKind, Sentiment, INSIGHT_FIELDS, RATING_MAX, RATING_MIN};
use std::fmt::Write;

/// Default persona placed at the top of every prompt.
pub const DEFAULT_PERSONA: &str =
    "You are a quality analyst reviewing recorded customer calls for a lending and collections team.";

/// Renders a transcript into the extraction prompt.
///
/// Output depends only on the persona and the transcript, so the same input
/// always produces the same prompt.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    /// Build the complete prompt for one transcript
    pub fn build(&self, transcript: &str) -> String {
        let mut prompt = String::with_capacity(2048 + transcript.len());

        prompt.push_str(&self.persona);
        prompt.push_str("\n\n");
        prompt.push_str(
            "Analyze the following call transcript and return ONLY a valid JSON object with these exact fields:\n\n",
        );

        for field in INSIGHT_FIELDS {
            // Writing into a String cannot fail.
            let _ = writeln!(
                prompt,
                "- {}: {} ({}{})",
                field.name,
                field.kind.type_name(),
                field.description,
                constraint(field.kind)
            );
        }

        prompt.push_str("\nTranscript:\n---\n");
        prompt.push_str(transcript);
        prompt.push_str("\n---\n\n");
        prompt.push_str(
            "Respond with the JSON object only. Do not include markdown formatting, code blocks, or explanations.",
        );

        prompt
    }
}

fn constraint(kind: FieldKind) -> String {
    match kind {
        FieldKind::Sentiment => {
            let literals: Vec<String> = Sentiment::ALL
                .iter()
                .map(|s| format!("\"{}\"", s))
                .collect();
            format!("; exactly one of {}", literals.join(", "))
        }
        FieldKind::Rating => format!("; whole number from {} to {}", RATING_MIN, RATING_MAX),
        FieldKind::Bool => "; true or false".to_string(),
        FieldKind::NonEmptyText => "; must not be empty".to_string(),
        FieldKind::Text => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_field_with_its_type() {
        let prompt = PromptBuilder::default().build("hello");
        for field in INSIGHT_FIELDS {
            let line = format!("- {}: {}", field.name, field.kind.type_name());
            assert!(prompt.contains(&line), "missing line for {}", field.name);
        }
    }

    #[test]
    fn spells_out_sentiment_literals() {
        let prompt = PromptBuilder::default().build("hello");
        assert!(prompt.contains(r#"exactly one of "Negative", "Neutral", "Positive""#));
        assert!(prompt.contains("whole number from 1 to 10"));
    }

    #[test]
    fn embeds_transcript_verbatim() {
        let transcript = "Agent: Namaste.\n  Customer: ```{weird}``` \u{20b9}5,000";
        let prompt = PromptBuilder::default().build(transcript);
        assert!(prompt.contains(transcript));
    }

    #[test]
    fn is_deterministic_and_handles_empty_input() {
        let builder = PromptBuilder::new("persona");
        assert_eq!(builder.build(""), builder.build(""));
        assert!(builder.build("").starts_with("persona"));
        assert!(builder.build("").contains("JSON object only"));
    }
}
