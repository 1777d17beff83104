//! Insight struct - the structured output extracted from a call transcript.
//!
//! `INSIGHT_FIELDS` is the single description of the contract. The prompt
//! builder renders it for the model and the validator checks model output
//! against it, so adding a field means touching this file and the struct.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest accepted agent performance rating.
pub const RATING_MIN: i64 = 1;
/// Highest accepted agent performance rating.
pub const RATING_MAX: i64 = 10;

/// Customer sentiment at a point in the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    /// Every accepted literal, in prompt order.
    pub const ALL: [Sentiment; 3] = [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
            Sentiment::Positive => "Positive",
        }
    }

    /// Exact, case-sensitive match against the accepted literals.
    pub fn from_literal(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured insight extracted from one call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Insight {
    /// The main intent behind the customer's side of the call
    pub customer_intent: String,
    /// Classification of the call, e.g. payment reminder, collection, recovery
    pub call_purpose: String,
    /// Whether the call achieved its objective
    pub call_objective_met: bool,
    /// Key outcomes such as promises to pay or settlement agreements
    pub key_results: String,
    /// Analysis of the customer's statements, intentions and circumstances
    pub customer_statements_analysis: String,
    /// Stated reasons for non-payment
    pub non_payment_reasons: String,
    pub sentiment_start: Sentiment,
    pub sentiment_end: Sentiment,
    pub overall_sentiment: Sentiment,
    /// Agent performance on a 1-10 scale, 10 being excellent
    #[schemars(range(min = 1, max = 10))]
    pub agent_performance_rating: i64,
    /// Feedback on the agent's professionalism and problem resolution
    pub agent_performance_feedback: String,
    /// Whether a follow-up action is needed
    pub action_required: bool,
    /// Summary of the whole call
    pub summary: String,
}

/// Primitive shape a field must take in model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any string, including empty
    Text,
    /// A string with visible content
    NonEmptyText,
    Bool,
    Sentiment,
    /// Integer within `RATING_MIN..=RATING_MAX`
    Rating,
}

impl FieldKind {
    /// Type name as shown to the model.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::NonEmptyText | FieldKind::Sentiment => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Rating => "integer",
        }
    }
}

/// One entry of the insight contract.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

pub const INSIGHT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "customer_intent",
        kind: FieldKind::NonEmptyText,
        description: "the main intent/purpose of the customer's call",
    },
    FieldSpec {
        name: "call_purpose",
        kind: FieldKind::Text,
        description: "the primary purpose of this call, e.g. payment reminder, collection, dispute resolution",
    },
    FieldSpec {
        name: "call_objective_met",
        kind: FieldKind::Bool,
        description: "whether the call objective was achieved",
    },
    FieldSpec {
        name: "key_results",
        kind: FieldKind::Text,
        description: "key outcomes like promises to pay, dispute resolutions, settlement agreements",
    },
    FieldSpec {
        name: "customer_statements_analysis",
        kind: FieldKind::Text,
        description: "analysis of customer statements for intentions and circumstances",
    },
    FieldSpec {
        name: "non_payment_reasons",
        kind: FieldKind::Text,
        description: "reasons for non-payment such as financial hardship or job loss",
    },
    FieldSpec {
        name: "sentiment_start",
        kind: FieldKind::Sentiment,
        description: "customer sentiment at the beginning of the call",
    },
    FieldSpec {
        name: "sentiment_end",
        kind: FieldKind::Sentiment,
        description: "customer sentiment at the end of the call",
    },
    FieldSpec {
        name: "overall_sentiment",
        kind: FieldKind::Sentiment,
        description: "overall sentiment of the call",
    },
    FieldSpec {
        name: "agent_performance_rating",
        kind: FieldKind::Rating,
        description: "agent performance rating, where 10 is excellent",
    },
    FieldSpec {
        name: "agent_performance_feedback",
        kind: FieldKind::Text,
        description: "feedback on the agent's conversation quality, professionalism and problem resolution",
    },
    FieldSpec {
        name: "action_required",
        kind: FieldKind::Bool,
        description: "true if follow-up action is needed",
    },
    FieldSpec {
        name: "summary",
        kind: FieldKind::Text,
        description: "comprehensive summary of the call",
    },
];

/// JSON Schema for `Insight`, as exported by `callsight schema`.
pub fn json_schema() -> schemars::Schema {
    schemars::schema_for!(Insight)
}
