use crate::oracle::OracleError;
use crate::session::Turn;
use serde::{Deserialize, Serialize};

/// Sessions shorter than this are failed without consulting the evaluator.
pub const MIN_TURNS_FOR_EVALUATION: usize = 2;

const MAX_SCORE: f64 = 100.0;
const TOO_SHORT_SCORE: u8 = 10;
const NO_ANSWER: &str = "(No Answer provided)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Borderline,
    Fail,
    /// Only produced locally when an evaluation could not be obtained.
    Error,
}

/// The final structured evaluation of a session. Scores are 0-100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub technical_score: u8,
    pub clarity_score: u8,
    pub fluency_score: u8,
    pub detailed_feedback: String,
    pub technical_strengths: Vec<String>,
    pub technical_weaknesses: Vec<String>,
    pub verdict: Verdict,
}

impl Report {
    /// The fixed report for sessions with too few turns to judge.
    pub fn too_short() -> Self {
        Self {
            technical_score: TOO_SHORT_SCORE,
            clarity_score: TOO_SHORT_SCORE,
            fluency_score: TOO_SHORT_SCORE,
            detailed_feedback: "The interview session was too short to evaluate. Answer at least two questions before requesting a report.".to_string(),
            technical_strengths: Vec::new(),
            technical_weaknesses: vec!["Insufficient interview length".to_string()],
            verdict: Verdict::Fail,
        }
    }

    /// The fixed report returned when the evaluator is unreachable or its
    /// reply does not satisfy the schema.
    pub fn evaluation_failed() -> Self {
        Self {
            technical_score: 0,
            clarity_score: 0,
            fluency_score: 0,
            detailed_feedback: "The evaluation could not be completed. Please try again later."
                .to_string(),
            technical_strengths: Vec::new(),
            technical_weaknesses: Vec::new(),
            verdict: Verdict::Error,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("reply is not valid report JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be between 0 and 100, got {value}")]
    ScoreOutOfRange { field: &'static str, value: f64 },
    #[error("unknown verdict {0:?}")]
    UnknownVerdict(String),
    #[error("detailed_feedback is empty")]
    EmptyFeedback,
}

/// What the evaluation oracle gave back, once classified.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationReply {
    Parsed(Report),
    SchemaError(String),
    Unavailable(String),
}

impl EvaluationReply {
    pub fn classify(result: Result<String, OracleError>) -> Self {
        match result {
            Ok(raw) => match parse_report(&raw) {
                Ok(report) => EvaluationReply::Parsed(report),
                Err(e) => {
                    tracing::warn!(error = %e, "evaluation reply failed schema validation");
                    EvaluationReply::SchemaError(raw)
                }
            },
            Err(OracleError::Malformed(raw)) => EvaluationReply::SchemaError(raw),
            Err(e) => EvaluationReply::Unavailable(e.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawReport {
    technical_score: f64,
    clarity_score: f64,
    fluency_score: f64,
    detailed_feedback: String,
    technical_strengths: Vec<String>,
    technical_weaknesses: Vec<String>,
    verdict: String,
}

/// Parses and normalizes an evaluator reply into a [`Report`].
pub fn parse_report(raw: &str) -> Result<Report, SchemaError> {
    let parsed: RawReport = serde_json::from_str(strip_code_fence(raw))?;

    let detailed_feedback = parsed.detailed_feedback.trim().to_string();
    if detailed_feedback.is_empty() {
        return Err(SchemaError::EmptyFeedback);
    }

    Ok(Report {
        technical_score: normalize_score("technical_score", parsed.technical_score)?,
        clarity_score: normalize_score("clarity_score", parsed.clarity_score)?,
        fluency_score: normalize_score("fluency_score", parsed.fluency_score)?,
        detailed_feedback,
        technical_strengths: clean_list(parsed.technical_strengths),
        technical_weaknesses: clean_list(parsed.technical_weaknesses),
        verdict: parse_verdict(&parsed.verdict)?,
    })
}

fn normalize_score(field: &'static str, value: f64) -> Result<u8, SchemaError> {
    if !value.is_finite() || !(0.0..=MAX_SCORE).contains(&value) {
        return Err(SchemaError::ScoreOutOfRange { field, value });
    }
    Ok(value.round() as u8)
}

fn parse_verdict(label: &str) -> Result<Verdict, SchemaError> {
    match label.trim().to_lowercase().as_str() {
        "pass" => Ok(Verdict::Pass),
        "borderline" => Ok(Verdict::Borderline),
        "fail" => Ok(Verdict::Fail),
        _ => Err(SchemaError::UnknownVerdict(label.to_string())),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

// Models in JSON mode still occasionally wrap the object in a Markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Renders history as the numbered transcript handed to the evaluator.
pub fn format_transcript(history: &[Turn]) -> String {
    history
        .iter()
        .enumerate()
        .map(|(idx, turn)| {
            let answer = if turn.is_answered() {
                turn.answer.as_str()
            } else {
                NO_ANSWER
            };
            format!("{}. Q: {}\n   A: {}", idx + 1, turn.question, answer)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "technical_score": 82.4,
        "clarity_score": 70,
        "fluency_score": 64.5,
        "detailed_feedback": "  Solid grasp of indexing.  ",
        "technical_strengths": ["SQL", "  "],
        "technical_weaknesses": ["Window functions"],
        "verdict": "pass"
    }"#;

    #[test]
    fn test_parse_report_normalizes_fields() {
        let report = parse_report(VALID).unwrap();
        assert_eq!(report.technical_score, 82);
        assert_eq!(report.clarity_score, 70);
        assert_eq!(report.fluency_score, 65);
        assert_eq!(report.detailed_feedback, "Solid grasp of indexing.");
        assert_eq!(report.technical_strengths, vec!["SQL".to_string()]);
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[test]
    fn test_parse_report_accepts_fenced_json() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_report(&fenced).is_ok());
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let raw = VALID.replace("82.4", "140");
        assert!(matches!(
            parse_report(&raw),
            Err(SchemaError::ScoreOutOfRange {
                field: "technical_score",
                ..
            })
        ));
    }

    #[test]
    fn test_error_verdict_from_oracle_is_rejected() {
        let raw = VALID.replace("\"pass\"", "\"Error\"");
        assert!(matches!(
            parse_report(&raw),
            Err(SchemaError::UnknownVerdict(_))
        ));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = r#"{"technical_score": 50, "verdict": "Fail"}"#;
        assert!(matches!(parse_report(raw), Err(SchemaError::Json(_))));
    }

    #[test]
    fn test_classify_reply() {
        assert!(matches!(
            EvaluationReply::classify(Ok(VALID.to_string())),
            EvaluationReply::Parsed(_)
        ));
        assert_eq!(
            EvaluationReply::classify(Ok("not json".to_string())),
            EvaluationReply::SchemaError("not json".to_string())
        );
        assert_eq!(
            EvaluationReply::classify(Err(OracleError::Malformed("{\"tech".to_string()))),
            EvaluationReply::SchemaError("{\"tech".to_string())
        );
        assert!(matches!(
            EvaluationReply::classify(Err(OracleError::Unavailable("down".to_string()))),
            EvaluationReply::Unavailable(_)
        ));
    }

    #[test]
    fn test_too_short_report_is_stable() {
        let report = Report::too_short();
        assert_eq!(report, Report::too_short());
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(
            (report.technical_score, report.clarity_score, report.fluency_score),
            (10, 10, 10)
        );
    }

    #[test]
    fn test_format_transcript_marks_missing_answers() {
        let history = vec![Turn::new("What is a join?", "Combines rows."), Turn::new("Why index?", "")];
        assert_eq!(
            format_transcript(&history),
            "1. Q: What is a join?\n   A: Combines rows.\n2. Q: Why index?\n   A: (No Answer provided)"
        );
    }
}
