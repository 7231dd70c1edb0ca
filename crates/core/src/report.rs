//! The progress report produced at the end of a session.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Name of the function the agent calls to deliver the final report.
pub const FINAL_REPORT_FUNCTION: &str = "generate_final_report";

const DEFAULT_GRAMMAR_STATUS: &str = "practiced";

fn default_grammar_status() -> String {
    DEFAULT_GRAMMAR_STATUS.to_string()
}

/// A grammar concept practised during the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrammarPoint {
    /// The grammar concept, e.g. "Past Simple Tense".
    pub point: String,
    /// Sentences from the conversation that used it.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Learning status, e.g. "practiced" or "needs_review".
    #[serde(default = "default_grammar_status")]
    pub status: String,
}

/// The part of a report the agent writes, i.e. the arguments of the
/// `generate_final_report` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PartialProgressReport {
    /// Topics covered in the conversation.
    pub topics_discussed: Vec<String>,
    /// Words the learner met or used for the first time.
    pub new_vocabulary: Vec<String>,
    pub grammar_points: Vec<GrammarPoint>,
    /// Short assessment of the learner's performance.
    pub ai_summary: String,
    /// Suggested CEFR level for this session, e.g. "B1".
    pub suggested_level: String,
}

impl PartialProgressReport {
    /// Parses the JSON-encoded `arguments` of a function call.
    pub fn from_arguments(arguments: &str) -> serde_json::Result<Self> {
        serde_json::from_str(arguments)
    }
}

/// A complete report: the agent's assessment plus locally measured session
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub session_date: DateTime<Utc>,
    pub duration_minutes: u32,
    pub topics_discussed: Vec<String>,
    pub new_vocabulary: Vec<String>,
    pub grammar_points: Vec<GrammarPoint>,
    pub ai_summary: String,
    pub suggested_level: String,
}

impl ProgressReport {
    pub fn from_partial(
        partial: PartialProgressReport,
        session_date: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            session_date,
            duration_minutes,
            topics_discussed: partial.topics_discussed,
            new_vocabulary: partial.new_vocabulary,
            grammar_points: partial.grammar_points,
            ai_summary: partial.ai_summary,
            suggested_level: partial.suggested_level,
        }
    }
}

/// Whole minutes between `started` and `ended`, rounded up and never less
/// than one.
pub fn duration_minutes(started: DateTime<Utc>, ended: DateTime<Utc>) -> u32 {
    let seconds = (ended - started).num_seconds().max(0);
    let minutes = (seconds + 59) / 60;
    u32::try_from(minutes).unwrap_or(u32::MAX).max(1)
}

/// The realtime tool definition for `generate_final_report`.
///
/// Its `parameters` are the JSON schema of [`PartialProgressReport`], so
/// whoever registers the tool with the gateway advertises exactly the shape
/// this crate parses.
pub fn final_report_tool() -> serde_json::Result<Value> {
    let parameters = serde_json::to_value(schemars::schema_for!(PartialProgressReport))?;
    Ok(json!({
        "type": "function",
        "name": FINAL_REPORT_FUNCTION,
        "description": "Generates the final performance report. Call only at the end of the conversation.",
        "parameters": parameters,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_partial_report_from_arguments() {
        let partial = PartialProgressReport::from_arguments(
            r#"{
                "topics_discussed": ["travel"],
                "new_vocabulary": ["itinerary"],
                "grammar_points": [{"point": "Present Perfect"}],
                "ai_summary": "Good session",
                "suggested_level": "B1"
            }"#,
        )
        .unwrap();

        assert_eq!(partial.topics_discussed, vec!["travel"]);
        assert_eq!(partial.grammar_points.len(), 1);
        assert!(partial.grammar_points[0].examples.is_empty());
        assert_eq!(partial.grammar_points[0].status, "practiced");
    }

    #[test]
    fn test_partial_report_requires_summary() {
        let result = PartialProgressReport::from_arguments(
            r#"{"topics_discussed":[],"new_vocabulary":[],"grammar_points":[],"suggested_level":"A2"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_rounds_up_with_minimum_of_one() {
        let start = Utc.with_ymd_and_hms(2025, 6, 30, 15, 0, 0).unwrap();
        assert_eq!(duration_minutes(start, start), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(59)), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(61)), 2);
        assert_eq!(duration_minutes(start, start + Duration::minutes(12)), 12);
        // Clock skew never yields zero.
        assert_eq!(duration_minutes(start, start - Duration::minutes(5)), 1);
    }

    #[test]
    fn test_report_serializes_backend_field_names() {
        let start = Utc.with_ymd_and_hms(2025, 6, 30, 15, 34, 8).unwrap();
        let partial = PartialProgressReport {
            topics_discussed: vec!["travel".to_string()],
            new_vocabulary: vec![],
            grammar_points: vec![],
            ai_summary: "Good session".to_string(),
            suggested_level: "B1".to_string(),
        };
        let value = serde_json::to_value(ProgressReport::from_partial(partial, start, 12)).unwrap();

        assert_eq!(value["session_date"], "2025-06-30T15:34:08Z");
        assert_eq!(value["duration_minutes"], 12);
        assert_eq!(value["suggested_level"], "B1");
    }

    #[test]
    fn test_final_report_tool_schema() {
        let tool = final_report_tool().unwrap();

        assert_eq!(tool["type"], "function");
        assert_eq!(tool["name"], FINAL_REPORT_FUNCTION);
        let properties = &tool["parameters"]["properties"];
        for field in [
            "topics_discussed",
            "new_vocabulary",
            "grammar_points",
            "ai_summary",
            "suggested_level",
        ] {
            assert!(properties.get(field).is_some(), "missing {}", field);
        }
    }
}
