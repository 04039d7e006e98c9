use std::collections::BTreeSet;

use serde_json::Value;

use crate::db::models::Question;
use crate::db::types::QuestionType;

pub fn can_auto_grade(question_type: QuestionType) -> bool {
    match question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse | QuestionType::ShortAnswer => true,
        QuestionType::Essay | QuestionType::FileUpload => false,
    }
}

/// Scores a response against the question's key.
///
/// Returns `None` for question types that need a human grader. Auto-graded
/// types are all-or-nothing: `max_score` or `0.0`.
pub fn auto_grade(question: &Question, response: &Value) -> Option<f64> {
    let key = &question.answer_key.0;
    let correct = match question.question_type {
        QuestionType::MultipleChoice => {
            let expected = options(key);
            !expected.is_empty() && expected == options(response)
        }
        QuestionType::TrueFalse => match (boolean(key), boolean(response)) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        },
        QuestionType::ShortAnswer => match text(response) {
            Some(given) => accepted(key).contains(&given),
            None => false,
        },
        QuestionType::Essay | QuestionType::FileUpload => return None,
    };

    Some(if correct { question.max_score } else { 0.0 })
}

/// Keys and responses may wrap their payload as `{"answer": ...}`.
fn unwrap(value: &Value) -> &Value {
    match value {
        Value::Object(map) => {
            map.get("answer").or_else(|| map.get("selected")).unwrap_or(value)
        }
        _ => value,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn options(value: &Value) -> BTreeSet<String> {
    match unwrap(value) {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match unwrap(value) {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" => Some(true),
            "false" | "f" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    scalar(unwrap(value)).map(|s| s.to_lowercase()).filter(|s| !s.is_empty())
}

fn accepted(key: &Value) -> BTreeSet<String> {
    match unwrap(key) {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}
