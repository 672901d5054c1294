use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Quiz document as stored by the authoring side, read-only for this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizEntity {
    /// Stable identifier for the quiz, as referenced by session creators.
    pub id: String,
    /// Display title of the quiz.
    #[serde(default)]
    pub title: String,
    /// Ordered, 0-indexed question sequence.
    #[serde(default)]
    pub questions: Vec<QuestionEntity>,
}

/// A single question record inside a quiz document.
///
/// Field names tolerate the legacy aliases used by older quiz documents
/// (`question` for the text, `correct_answer` for the correctness value).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEntity {
    /// Optional stable identifier; the question index is used as fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Question text shown to participants.
    #[serde(rename = "questionText", alias = "question", default)]
    pub text: String,
    /// Type tag (`singleMcq`, `multiMcq`, `dragAndDrop`, ...).
    #[serde(rename = "type", default = "default_question_type")]
    pub kind: String,
    /// Answer options for choice questions.
    #[serde(default)]
    pub options: Vec<String>,
    /// Explicit correctness specification, when present.
    #[serde(
        rename = "correctAnswer",
        alias = "correct_answer",
        default,
        skip_serializing_if = "Value::is_null"
    )]
    pub correct_answer: Value,
    /// Correct option index for single-choice questions.
    #[serde(
        rename = "correctAnswerIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_answer_index: Option<i64>,
    /// Correct option index set for multi-choice questions.
    #[serde(
        rename = "correctAnswerIndices",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_answer_indices: Option<Vec<i64>>,
    /// Draggable items for drag-and-drop questions.
    #[serde(rename = "dragItems", default, skip_serializing_if = "Option::is_none")]
    pub drag_items: Option<Vec<String>>,
    /// Drop targets for drag-and-drop questions.
    #[serde(
        rename = "dropTargets",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub drop_targets: Option<Vec<String>>,
    /// Position-to-value mapping for drag-and-drop correctness.
    #[serde(
        rename = "correctMatches",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_matches: Option<Value>,
    /// Optional illustration shown with the question.
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_question_type() -> String {
    "single".to_owned()
}

impl QuestionEntity {
    /// Resolve the opaque correctness specification for this question.
    ///
    /// Explicit `correctAnswer` wins; otherwise the type-specific field is
    /// promoted into a comparable value. `Value::Null` means the document
    /// carries no correctness information at all.
    pub fn correctness_spec(&self) -> Value {
        if !self.correct_answer.is_null() {
            return self.correct_answer.clone();
        }
        if let Some(index) = self.correct_answer_index {
            return Value::from(index);
        }
        if let Some(indices) = &self.correct_answer_indices {
            return Value::from(indices.clone());
        }
        if let Some(matches) = &self.correct_matches {
            return matches.clone();
        }
        Value::Null
    }
}

/// Snapshot of one participant embedded in the final result document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantResultEntity {
    /// Participant identifier supplied by the caller at join time.
    pub participant_id: String,
    /// Display name chosen at join time.
    pub username: String,
    /// Final cumulative score.
    pub score: i64,
    /// Number of questions this participant answered.
    pub answered_count: usize,
    /// Number of correct answers.
    pub correct_count: usize,
}

/// A single final ranking row embedded in the result document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntity {
    /// 1-based rank.
    pub rank: usize,
    /// Participant identifier.
    pub participant_id: String,
    /// Display name, `"Unknown"` when the participant record is gone.
    pub username: String,
    /// Final score.
    pub score: i64,
    /// Accuracy percentage rounded to 2 decimals.
    pub accuracy: f64,
}

/// Final result document written once when a session completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalResultEntity {
    /// Unique identifier of the result document.
    pub id: Uuid,
    /// Session join code the results belong to.
    pub session_code: String,
    /// Quiz the session was playing.
    pub quiz_id: String,
    /// Host identity that ran the session.
    pub host_id: String,
    /// Full participant snapshot at completion.
    pub participants: Vec<ParticipantResultEntity>,
    /// Final rankings with accuracy.
    pub rankings: Vec<RankingEntity>,
    /// Session creation timestamp (RFC 3339).
    pub created_at: String,
    /// Session completion timestamp (RFC 3339).
    pub completed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_text_accepts_legacy_alias() {
        let q: QuestionEntity = serde_json::from_value(json!({
            "question": "What is 2+2?",
            "type": "singleMcq",
            "options": ["3", "4"],
            "correctAnswerIndex": 1
        }))
        .unwrap();
        assert_eq!(q.text, "What is 2+2?");
        assert_eq!(q.correctness_spec(), json!(1));
    }

    #[test]
    fn correctness_spec_prefers_explicit_answer() {
        let q: QuestionEntity = serde_json::from_value(json!({
            "questionText": "Pick",
            "correctAnswer": "2",
            "correctAnswerIndex": 0
        }))
        .unwrap();
        assert_eq!(q.correctness_spec(), json!("2"));
    }

    #[test]
    fn correctness_spec_falls_back_to_matches() {
        let q: QuestionEntity = serde_json::from_value(json!({
            "questionText": "Match",
            "type": "dragAndDrop",
            "dragItems": ["a", "b"],
            "dropTargets": ["x", "y"],
            "correctMatches": {"x": "a", "y": "b"}
        }))
        .unwrap();
        assert_eq!(q.correctness_spec(), json!({"x": "a", "y": "b"}));
    }

    #[test]
    fn missing_type_defaults_to_single() {
        let q: QuestionEntity =
            serde_json::from_value(json!({ "questionText": "Q" })).unwrap();
        assert_eq!(q.kind, "single");
        assert!(q.correctness_spec().is_null());
    }
}
