use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    Text,
    Textarea,
    MultipleChoice,
    Rating,
    Image,
    File,
}

pub const MAX_RATING_SCALE: i32 = 10;

/// A question definition. The string `id` is the stable key into a
/// response's answer map; `choices`/`multiple` only apply to
/// multiple-choice questions and `scale` only to rating questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default = "default_scale")]
    pub scale: i32,
}

fn default_scale() -> i32 {
    MAX_RATING_SCALE
}

#[derive(sqlx::Type)]
#[sqlx(type_name = "recurrence")]
#[sqlx(rename_all = "lowercase")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize)]
pub struct Form {
    pub id: i32,
    pub space_id: i32,
    pub title: String,
    pub recurrence: Recurrence,
    pub questions: Vec<Question>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormInsertion {
    pub title: String,
    pub recurrence: Recurrence,
    pub questions: Vec<Question>,
}

/// Checks question definitions at form creation time so that answer
/// validation can rely on them later.
pub fn validate_questions(questions: &[Question]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("a form needs at least one question".into());
    }
    if let Some(q) = questions.iter().find(|q| q.id.trim().is_empty()) {
        return Err(format!("question \"{}\" has an empty id", q.title));
    }
    if let Some(q) = questions.iter().find(|q| q.title.trim().is_empty()) {
        return Err(format!("question {} has an empty title", q.id));
    }
    let dups: Vec<&str> = questions.iter().map(|q| q.id.as_str()).duplicates().collect();
    if !dups.is_empty() {
        return Err(format!("duplicate question ids: {}", dups.iter().join(", ")));
    }
    for q in questions {
        match q.kind {
            QuestionType::MultipleChoice => {
                if q.choices.is_empty() {
                    return Err(format!("multiple-choice question {} has no choices", q.id));
                }
            }
            QuestionType::Rating => {
                if !(1..=MAX_RATING_SCALE).contains(&q.scale) {
                    return Err(format!("rating question {} has scale {} outside 1..={}", q.id, q.scale, MAX_RATING_SCALE));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_question(id: &str) -> Question {
        Question {
            id: id.into(),
            title: format!("Question {id}"),
            kind: QuestionType::Text,
            required: false,
            choices: vec![],
            multiple: false,
            scale: MAX_RATING_SCALE,
        }
    }

    #[test]
    fn accepts_a_plain_form() {
        let questions = vec![text_question("q1"), text_question("q2")];
        assert!(validate_questions(&questions).is_ok());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let questions = vec![text_question("q1"), text_question("q1")];
        let err = validate_questions(&questions).unwrap_err();
        assert!(err.contains("q1"), "{err}");
    }

    #[test]
    fn rejects_empty_forms_and_blank_ids() {
        assert!(validate_questions(&[]).is_err());
        let mut q = text_question(" ");
        q.id = "  ".into();
        assert!(validate_questions(&[q]).is_err());
    }

    #[test]
    fn rejects_choiceless_multiple_choice() {
        let mut q = text_question("pick");
        q.kind = QuestionType::MultipleChoice;
        let err = validate_questions(&[q]).unwrap_err();
        assert!(err.contains("no choices"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_rating_scale() {
        let mut q = text_question("mood");
        q.kind = QuestionType::Rating;
        q.scale = 11;
        assert!(validate_questions(std::slice::from_ref(&q)).is_err());
        q.scale = 0;
        assert!(validate_questions(std::slice::from_ref(&q)).is_err());
        q.scale = 5;
        assert!(validate_questions(&[q]).is_ok());
    }

    #[test]
    fn question_type_uses_kebab_case_on_the_wire() {
        let q = Question {
            kind: QuestionType::MultipleChoice,
            choices: vec!["a".into()],
            ..text_question("pick")
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "multiple-choice");
    }
}
