//! Accuracy evaluation against hand-labelled transcripts.
//!
//! A dataset is a JSON array of [`LabelledCall`]s. Each call is run through
//! the normal [`Analyzer`], so successful analyses are persisted like any
//! other, and the resulting insight is compared field by field with the
//! labels. Free-text fields pass when the output shares at least one word
//! with the label; enum and bool fields must match exactly; the rating must
//! reach the labelled minimum.

use crate::insight::{Insight, Sentiment};
use crate::pipeline::{Analyzer, ErrorKind};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("failed to read dataset: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse dataset: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("dataset contains no labelled calls")]
    EmptyDataset,
}

/// One transcript with the insight a reviewer expects for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelledCall {
    pub id: u64,
    /// Collection stage, e.g. `Pre-Due` or `Recovery (D+90)`
    pub stage: String,
    pub transcript: String,
    pub expected: Expected,
}

/// Labelled values for the fields that are scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expected {
    pub customer_intent: String,
    pub call_purpose: String,
    pub call_objective_met: bool,
    pub key_results: String,
    pub non_payment_reasons: String,
    pub sentiment_start: Sentiment,
    pub sentiment_end: Sentiment,
    pub overall_sentiment: Sentiment,
    /// Lowest acceptable `agent_performance_rating`
    pub agent_performance_min: i64,
    pub action_required: bool,
}

pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<LabelledCall>, EvalError> {
    let text = std::fs::read_to_string(path)?;
    parse_dataset(&text)
}

pub fn parse_dataset(text: &str) -> Result<Vec<LabelledCall>, EvalError> {
    let calls: Vec<LabelledCall> = serde_json::from_str(text)?;
    if calls.is_empty() {
        return Err(EvalError::EmptyDataset);
    }
    Ok(calls)
}

/// A single scored comparison between an insight and its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Intent,
    CallPurpose,
    CallObjective,
    KeyResults,
    NonPaymentReasons,
    SentimentStart,
    SentimentEnd,
    OverallSentiment,
    AgentPerformance,
    ActionRequired,
}

impl Check {
    pub const ALL: [Check; 10] = [
        Check::Intent,
        Check::CallPurpose,
        Check::CallObjective,
        Check::KeyResults,
        Check::NonPaymentReasons,
        Check::SentimentStart,
        Check::SentimentEnd,
        Check::OverallSentiment,
        Check::AgentPerformance,
        Check::ActionRequired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Check::Intent => "intent",
            Check::CallPurpose => "call_purpose",
            Check::CallObjective => "call_objective",
            Check::KeyResults => "key_results",
            Check::NonPaymentReasons => "non_payment_reasons",
            Check::SentimentStart => "sentiment_start",
            Check::SentimentEnd => "sentiment_end",
            Check::OverallSentiment => "overall_sentiment",
            Check::AgentPerformance => "agent_performance",
            Check::ActionRequired => "action_required",
        }
    }

    /// Accuracy (percent) below which the report flags this check.
    pub fn target(&self) -> Option<f64> {
        match self {
            Check::Intent | Check::AgentPerformance => Some(70.0),
            Check::CallPurpose | Check::OverallSentiment => Some(80.0),
            Check::CallObjective | Check::KeyResults | Check::NonPaymentReasons => Some(75.0),
            Check::ActionRequired => Some(85.0),
            Check::SentimentStart | Check::SentimentEnd => None,
        }
    }

    fn passes(&self, expected: &Expected, actual: &Insight) -> bool {
        match self {
            Check::Intent => shares_keyword(&expected.customer_intent, &actual.customer_intent),
            Check::CallPurpose => shares_keyword(&expected.call_purpose, &actual.call_purpose),
            Check::CallObjective => expected.call_objective_met == actual.call_objective_met,
            Check::KeyResults => shares_keyword(&expected.key_results, &actual.key_results),
            Check::NonPaymentReasons => {
                shares_keyword(&expected.non_payment_reasons, &actual.non_payment_reasons)
            }
            Check::SentimentStart => expected.sentiment_start == actual.sentiment_start,
            Check::SentimentEnd => expected.sentiment_end == actual.sentiment_end,
            Check::OverallSentiment => expected.overall_sentiment == actual.overall_sentiment,
            Check::AgentPerformance => {
                actual.agent_performance_rating >= expected.agent_performance_min
            }
            Check::ActionRequired => expected.action_required == actual.action_required,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when any word of the label occurs, case-insensitively, in the output.
fn shares_keyword(expected: &str, actual: &str) -> bool {
    let actual = actual.to_lowercase();
    expected
        .to_lowercase()
        .split_whitespace()
        .any(|word| actual.contains(word))
}

/// Pass/fail per [`Check`] for one analyzed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scores([bool; Check::ALL.len()]);

impl Scores {
    pub fn passed(&self, check: Check) -> bool {
        self.0[check as usize]
    }

    pub fn passed_count(&self) -> usize {
        self.0.iter().filter(|&&ok| ok).count()
    }
}

impl Serialize for Scores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Check::ALL.len()))?;
        for check in Check::ALL {
            map.serialize_entry(check.as_str(), &self.passed(check))?;
        }
        map.end()
    }
}

/// Score one insight against its label.
pub fn score(expected: &Expected, actual: &Insight) -> Scores {
    let mut scores = Scores::default();
    for check in Check::ALL {
        scores.0[check as usize] = check.passes(expected, actual);
    }
    scores
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub id: u64,
    pub stage: String,
    #[serde(flatten)]
    pub result: CaseResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseResult {
    Analyzed { record_id: u64, scores: Scores },
    Failed { error: ErrorKind, message: String },
}

impl CaseOutcome {
    pub fn scores(&self) -> Option<&Scores> {
        match &self.result {
            CaseResult::Analyzed { scores, .. } => Some(scores),
            CaseResult::Failed { .. } => None,
        }
    }
}

/// Analyze every labelled call in order and score the results.
///
/// A failed analysis is recorded as such and the run moves on.
pub async fn run(analyzer: &Analyzer, calls: &[LabelledCall]) -> Vec<CaseOutcome> {
    let mut outcomes = Vec::with_capacity(calls.len());
    for call in calls {
        let result = match analyzer.analyze(&call.transcript).await {
            Ok(analysis) => {
                let scores = score(&call.expected, &analysis.insights);
                info!(case = call.id, passed = scores.passed_count(), "scored labelled call");
                CaseResult::Analyzed {
                    record_id: analysis.record_id,
                    scores,
                }
            }
            Err(err) => {
                warn!(case = call.id, kind = %err.kind(), "labelled call failed");
                CaseResult::Failed {
                    error: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        outcomes.push(CaseOutcome {
            id: call.id,
            stage: call.stage.clone(),
            result,
        });
    }
    outcomes
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAccuracy {
    pub check: Check,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTally {
    pub stage: String,
    pub successful: usize,
    pub total: usize,
}

/// Aggregate view of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    /// Share of successful analyses passing each check; empty when none succeeded
    pub accuracy: Vec<FieldAccuracy>,
    /// Per stage, in order of first appearance
    pub stages: Vec<StageTally>,
}

const SUCCESS_TARGET: f64 = 80.0;

impl EvalSummary {
    pub fn compile(outcomes: &[CaseOutcome]) -> Self {
        let total = outcomes.len();
        let scored: Vec<&Scores> = outcomes.iter().filter_map(CaseOutcome::scores).collect();
        let successful = scored.len();

        let accuracy = if successful == 0 {
            Vec::new()
        } else {
            Check::ALL
                .iter()
                .map(|&check| FieldAccuracy {
                    check,
                    percent: percent(scored.iter().filter(|s| s.passed(check)).count(), successful),
                })
                .collect()
        };

        let mut stages: Vec<StageTally> = Vec::new();
        for outcome in outcomes {
            let idx = match stages.iter().position(|t| t.stage == outcome.stage) {
                Some(idx) => idx,
                None => {
                    stages.push(StageTally {
                        stage: outcome.stage.clone(),
                        successful: 0,
                        total: 0,
                    });
                    stages.len() - 1
                }
            };
            stages[idx].total += 1;
            if outcome.scores().is_some() {
                stages[idx].successful += 1;
            }
        }

        Self {
            total,
            successful,
            failed: total - successful,
            success_rate: percent(successful, total),
            accuracy,
            stages,
        }
    }

    pub fn accuracy_of(&self, check: Check) -> Option<f64> {
        self.accuracy
            .iter()
            .find(|a| a.check == check)
            .map(|a| a.percent)
    }

    /// Checks (and the overall success rate) that fell short of their targets.
    pub fn shortfalls(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.success_rate < SUCCESS_TARGET {
            notes.push(format!(
                "success rate {:.1}% is below {:.0}%: review prompt wording and model choice",
                self.success_rate, SUCCESS_TARGET
            ));
        }
        for field in &self.accuracy {
            if let Some(target) = field.check.target() {
                if field.percent < target {
                    notes.push(format!(
                        "{} accuracy {:.1}% is below {:.0}%",
                        field.check, field.percent, target
                    ));
                }
            }
        }
        notes
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Expected {
        Expected {
            customer_intent: "Settlement Inquiry".into(),
            call_purpose: "Recovery Settlement".into(),
            call_objective_met: true,
            key_results: "50% settlement offer".into(),
            non_payment_reasons: "Job loss".into(),
            sentiment_start: Sentiment::Negative,
            sentiment_end: Sentiment::Neutral,
            overall_sentiment: Sentiment::Neutral,
            agent_performance_min: 7,
            action_required: true,
        }
    }

    fn matching_insight() -> Insight {
        Insight {
            customer_intent: "wants a one-time settlement".into(),
            call_purpose: "Loan recovery".into(),
            call_objective_met: true,
            key_results: "Agent offered a 50% OTS".into(),
            customer_statements_analysis: "calm, negotiating".into(),
            non_payment_reasons: "lost his job in March".into(),
            sentiment_start: Sentiment::Negative,
            sentiment_end: Sentiment::Neutral,
            overall_sentiment: Sentiment::Neutral,
            agent_performance_rating: 7,
            agent_performance_feedback: "clear".into(),
            action_required: true,
            summary: "Settlement discussed.".into(),
        }
    }

    fn analyzed(id: u64, stage: &str, scores: Scores) -> CaseOutcome {
        CaseOutcome {
            id,
            stage: stage.into(),
            result: CaseResult::Analyzed { record_id: id, scores },
        }
    }

    fn failed(id: u64, stage: &str) -> CaseOutcome {
        CaseOutcome {
            id,
            stage: stage.into(),
            result: CaseResult::Failed {
                error: ErrorKind::ParseFailure,
                message: "model output is not valid JSON".into(),
            },
        }
    }

    #[test]
    fn matching_insight_passes_every_check() {
        let scores = score(&expected(), &matching_insight());
        for check in Check::ALL {
            assert!(scores.passed(check), "{} should pass", check);
        }
        assert_eq!(scores.passed_count(), Check::ALL.len());
    }

    #[test]
    fn keyword_checks_ignore_case_and_need_one_shared_word() {
        let mut actual = matching_insight();
        actual.customer_intent = "SETTLEMENT".into();
        actual.call_purpose = "payment reminder".into();
        actual.non_payment_reasons = String::new();

        let scores = score(&expected(), &actual);
        assert!(scores.passed(Check::Intent));
        assert!(!scores.passed(Check::CallPurpose));
        assert!(!scores.passed(Check::NonPaymentReasons));
    }

    #[test]
    fn exact_checks_fail_on_any_difference() {
        let mut actual = matching_insight();
        actual.sentiment_end = Sentiment::Positive;
        actual.call_objective_met = false;
        actual.action_required = false;

        let scores = score(&expected(), &actual);
        assert!(!scores.passed(Check::SentimentEnd));
        assert!(!scores.passed(Check::CallObjective));
        assert!(!scores.passed(Check::ActionRequired));
        assert!(scores.passed(Check::SentimentStart));
        assert!(scores.passed(Check::OverallSentiment));
    }

    #[test]
    fn rating_must_reach_the_labelled_minimum() {
        let mut actual = matching_insight();
        actual.agent_performance_rating = 6;
        assert!(!score(&expected(), &actual).passed(Check::AgentPerformance));

        actual.agent_performance_rating = 9;
        assert!(score(&expected(), &actual).passed(Check::AgentPerformance));
    }

    #[test]
    fn summary_counts_accuracy_over_successful_calls_only() {
        let all_pass = score(&expected(), &matching_insight());
        let mut weak = matching_insight();
        weak.customer_intent = "dispute".into();
        weak.agent_performance_rating = 3;
        let some_pass = score(&expected(), &weak);

        let outcomes = vec![
            analyzed(1, "Pre-Due", all_pass),
            analyzed(2, "Recovery", some_pass),
            failed(3, "Recovery"),
            analyzed(4, "Pre-Due", all_pass),
        ];
        let summary = EvalSummary::compile(&outcomes);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 75.0);
        assert_eq!(summary.accuracy_of(Check::ActionRequired), Some(100.0));
        let intent = summary.accuracy_of(Check::Intent).unwrap();
        assert!((intent - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            summary.stages,
            vec![
                StageTally { stage: "Pre-Due".into(), successful: 2, total: 2 },
                StageTally { stage: "Recovery".into(), successful: 1, total: 2 },
            ]
        );
    }

    #[test]
    fn shortfalls_name_checks_below_target() {
        let mut weak = matching_insight();
        weak.customer_intent = "dispute".into();
        let outcomes = vec![
            analyzed(1, "Pre-Due", score(&expected(), &weak)),
            failed(2, "Pre-Due"),
        ];
        let notes = EvalSummary::compile(&outcomes).shortfalls();

        assert!(notes.iter().any(|n| n.starts_with("success rate 50.0%")));
        assert!(notes.iter().any(|n| n.starts_with("intent accuracy 0.0%")));
        assert!(!notes.iter().any(|n| n.starts_with("call_purpose")));
    }

    #[test]
    fn all_failed_run_has_no_accuracy() {
        let summary = EvalSummary::compile(&[failed(1, "Pre-Due")]);
        assert_eq!(summary.success_rate, 0.0);
        assert!(summary.accuracy.is_empty());
        assert_eq!(summary.accuracy_of(Check::Intent), None);
    }

    #[test]
    fn scores_serialize_as_named_flags() {
        let json = serde_json::to_value(analyzed(5, "Pre-Due", score(&expected(), &matching_insight())))
            .unwrap();
        assert_eq!(json["status"], "analyzed");
        assert_eq!(json["scores"]["non_payment_reasons"], true);
        assert_eq!(json["scores"].as_object().unwrap().len(), Check::ALL.len());
    }

    #[test]
    fn bundled_dataset_parses() {
        let calls = parse_dataset(include_str!("../fixtures/labelled_calls.json")).unwrap();
        assert_eq!(calls.len(), 10);
        assert!(calls.iter().all(|c| !c.transcript.trim().is_empty()));
        assert_eq!(calls[0].stage, "Pre-Due");
        assert_eq!(calls[0].expected.agent_performance_min, 7);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(matches!(parse_dataset("[]"), Err(EvalError::EmptyDataset)));
        assert!(matches!(parse_dataset("{}"), Err(EvalError::ParseError(_))));
    }
}
