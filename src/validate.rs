//! Strict validation of model output against the insight contract.
//!
//! Validation fails closed: anything missing, mistyped or outside the
//! allowed values is reported, never defaulted or coerced.

use crate::insight::{FieldKind, FieldSpec, Insight, Sentiment, INSIGHT_FIELDS, RATING_MAX, RATING_MIN};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// What is wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Missing,
    WrongType { expected: &'static str },
    NotInEnum { value: String },
    OutOfRange { value: i64 },
    Empty,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Missing => write!(f, "missing"),
            Problem::WrongType { expected } => write!(f, "expected {}", expected),
            Problem::NotInEnum { value } => {
                let allowed: Vec<&str> = Sentiment::ALL.iter().map(|s| s.as_str()).collect();
                write!(f, "{:?} is not one of {}", value, allowed.join(", "))
            }
            Problem::OutOfRange { value } => {
                write!(f, "{} is outside {}..={}", value, RATING_MIN, RATING_MAX)
            }
            Problem::Empty => write!(f, "must not be empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub problem: Problem,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// JSON parsed but does not satisfy the insight contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid fields: {}", join_violations(.0))]
    Fields(Vec<FieldViolation>),
}

impl SchemaError {
    /// Names of every offending field.
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            SchemaError::NotAnObject(_) => Vec::new(),
            SchemaError::Fields(violations) => violations.iter().map(|v| v.field).collect(),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ValidationError {
    /// The candidate is kept for diagnostics but left out of the message.
    #[error("model output is not valid JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        candidate: String,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Parse and validate a JSON candidate into an `Insight`.
pub fn validate(candidate: &str) -> Result<Insight, ValidationError> {
    let value: Value = serde_json::from_str(candidate).map_err(|source| ValidationError::Parse {
        source,
        candidate: candidate.to_string(),
    })?;
    Ok(validate_value(value)?)
}

/// Validate an already parsed JSON value.
pub fn validate_value(value: Value) -> Result<Insight, SchemaError> {
    let Value::Object(object) = value else {
        return Err(SchemaError::NotAnObject(json_type(&value)));
    };

    let violations: Vec<FieldViolation> = INSIGHT_FIELDS
        .iter()
        .filter_map(|spec| {
            check_field(spec, &object).map(|problem| FieldViolation {
                field: spec.name,
                problem,
            })
        })
        .collect();

    if !violations.is_empty() {
        return Err(SchemaError::Fields(violations));
    }

    build(&object)
}

fn check_field(spec: &FieldSpec, object: &Map<String, Value>) -> Option<Problem> {
    let Some(value) = object.get(spec.name) else {
        return Some(Problem::Missing);
    };

    match (spec.kind, value) {
        (FieldKind::Text, Value::String(_)) => None,
        (FieldKind::NonEmptyText, Value::String(s)) => s.trim().is_empty().then_some(Problem::Empty),
        (FieldKind::Bool, Value::Bool(_)) => None,
        (FieldKind::Sentiment, Value::String(s)) => match Sentiment::from_literal(s) {
            Some(_) => None,
            None => Some(Problem::NotInEnum { value: s.clone() }),
        },
        // as_i64 is None for floats such as 8.0 and for values beyond i64.
        (FieldKind::Rating, Value::Number(n)) => match n.as_i64() {
            Some(r) if (RATING_MIN..=RATING_MAX).contains(&r) => None,
            Some(r) => Some(Problem::OutOfRange { value: r }),
            None => Some(Problem::WrongType { expected: "integer" }),
        },
        (kind, _) => Some(Problem::WrongType {
            expected: kind.type_name(),
        }),
    }
}

/// Assemble the struct once every field has been checked.
fn build(object: &Map<String, Value>) -> Result<Insight, SchemaError> {
    let text = |name: &'static str| -> Result<String, SchemaError> {
        object
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| wrong_type(name, "string"))
    };
    let flag = |name: &'static str| -> Result<bool, SchemaError> {
        object
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| wrong_type(name, "boolean"))
    };
    let sentiment = |name: &'static str| -> Result<Sentiment, SchemaError> {
        object
            .get(name)
            .and_then(Value::as_str)
            .and_then(Sentiment::from_literal)
            .ok_or_else(|| wrong_type(name, "string"))
    };

    Ok(Insight {
        customer_intent: text("customer_intent")?,
        call_purpose: text("call_purpose")?,
        call_objective_met: flag("call_objective_met")?,
        key_results: text("key_results")?,
        customer_statements_analysis: text("customer_statements_analysis")?,
        non_payment_reasons: text("non_payment_reasons")?,
        sentiment_start: sentiment("sentiment_start")?,
        sentiment_end: sentiment("sentiment_end")?,
        overall_sentiment: sentiment("overall_sentiment")?,
        agent_performance_rating: object
            .get("agent_performance_rating")
            .and_then(Value::as_i64)
            .ok_or_else(|| wrong_type("agent_performance_rating", "integer"))?,
        agent_performance_feedback: text("agent_performance_feedback")?,
        action_required: flag("action_required")?,
        summary: text("summary")?,
    })
}

fn wrong_type(field: &'static str, expected: &'static str) -> SchemaError {
    SchemaError::Fields(vec![FieldViolation {
        field,
        problem: Problem::WrongType { expected },
    }])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Insight {
        Insight {
            customer_intent: "payment promise".into(),
            call_purpose: "Payment Reminder".into(),
            call_objective_met: true,
            key_results: "PTP next week".into(),
            customer_statements_analysis: "customer committed to pay".into(),
            non_payment_reasons: "none".into(),
            sentiment_start: Sentiment::Neutral,
            sentiment_end: Sentiment::Positive,
            overall_sentiment: Sentiment::Positive,
            agent_performance_rating: 8,
            agent_performance_feedback: "clear and professional".into(),
            action_required: true,
            summary: "Customer promised payment next week.".into(),
        }
    }

    fn sample_value() -> Value {
        serde_json::to_value(sample()).unwrap()
    }

    fn schema_error(value: Value) -> SchemaError {
        match validate(&value.to_string()) {
            Err(ValidationError::Schema(e)) => e,
            other => panic!("expected schema failure, got {:?}", other),
        }
    }

    #[test]
    fn round_trips_a_valid_insight() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(validate(&json).unwrap(), sample());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut value = sample_value();
        value["confidence"] = json!(0.9);
        assert_eq!(validate_value(value).unwrap(), sample());
    }

    #[test]
    fn rejects_unknown_sentiment() {
        let mut value = sample_value();
        value["sentiment_start"] = json!("Happy");

        let err = schema_error(value);
        assert_eq!(err.fields(), vec!["sentiment_start"]);
        assert!(err.to_string().contains("\"Happy\" is not one of Negative, Neutral, Positive"));
    }

    #[test]
    fn sentiment_match_is_case_sensitive() {
        let mut value = sample_value();
        value["overall_sentiment"] = json!("positive");
        assert_eq!(schema_error(value).fields(), vec!["overall_sentiment"]);
    }

    #[test]
    fn names_missing_field() {
        let mut value = sample_value();
        value.as_object_mut().unwrap().remove("action_required");

        let err = schema_error(value);
        assert_eq!(
            err,
            SchemaError::Fields(vec![FieldViolation {
                field: "action_required",
                problem: Problem::Missing,
            }])
        );
    }

    #[test]
    fn reports_every_violation() {
        let mut value = sample_value();
        value["call_objective_met"] = json!("true");
        value["agent_performance_rating"] = json!(8.0);
        value["customer_intent"] = json!("   ");
        value.as_object_mut().unwrap().remove("summary");

        assert_eq!(
            schema_error(value).fields(),
            vec!["customer_intent", "call_objective_met", "agent_performance_rating", "summary"]
        );
    }

    #[test]
    fn rating_must_be_in_range() {
        for rating in [0, 11, -3] {
            let mut value = sample_value();
            value["agent_performance_rating"] = json!(rating);
            let err = schema_error(value);
            assert_eq!(
                err,
                SchemaError::Fields(vec![FieldViolation {
                    field: "agent_performance_rating",
                    problem: Problem::OutOfRange { value: rating },
                }])
            );
        }
    }

    #[test]
    fn rating_as_string_is_wrong_type() {
        let mut value = sample_value();
        value["agent_performance_rating"] = json!("8");
        let err = schema_error(value);
        assert!(err.to_string().contains("agent_performance_rating: expected integer"));
    }

    #[test]
    fn null_counts_as_wrong_type() {
        let mut value = sample_value();
        value["key_results"] = Value::Null;
        assert_eq!(schema_error(value).fields(), vec!["key_results"]);
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert_eq!(schema_error(json!([1, 2])), SchemaError::NotAnObject("array"));
    }

    #[test]
    fn parse_failure_keeps_candidate_out_of_message() {
        let candidate = r#"{"customer_intent": "secret account 1234""#;
        match validate(candidate) {
            Err(ValidationError::Parse { candidate: kept, .. }) => assert_eq!(kept, candidate),
            other => panic!("expected parse failure, got {:?}", other),
        }
        let message = validate(candidate).unwrap_err().to_string();
        assert!(!message.contains("1234"));
    }
}
