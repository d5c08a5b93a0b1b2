use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::form::{Question, QuestionType};

/// Question id -> answer value. Drafts may hold any subset of a form's
/// questions.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// One answer, shaped by its question's type: plain string for
/// text/textarea and for image/file URLs, a number for ratings, a string
/// or string-list for multiple-choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Number(_) => false,
            AnswerValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Type-check against the question this value answers.
    pub fn check(&self, question: &Question) -> Result<(), String> {
        match (question.kind, self) {
            (QuestionType::Text | QuestionType::Textarea, AnswerValue::Text(_)) => Ok(()),
            (QuestionType::Image | QuestionType::File, AnswerValue::Text(_)) => Ok(()),
            (QuestionType::Rating, AnswerValue::Number(n)) => {
                if (1.0..=question.scale as f64).contains(n) {
                    Ok(())
                } else {
                    Err(format!("rating for {} must be between 1 and {}", question.id, question.scale))
                }
            }
            (QuestionType::MultipleChoice, AnswerValue::Text(choice)) if !question.multiple => {
                if question.choices.iter().any(|c| c == choice) {
                    Ok(())
                } else {
                    Err(format!("{choice} is not a choice of question {}", question.id))
                }
            }
            (QuestionType::MultipleChoice, AnswerValue::List(picked)) if question.multiple => {
                match picked.iter().find(|p| !question.choices.contains(*p)) {
                    None => Ok(()),
                    Some(bad) => Err(format!("{bad} is not a choice of question {}", question.id)),
                }
            }
            _ => Err(format!("answer for question {} does not match its {:?} type", question.id, question.kind)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: i32,
    pub form_id: i32,
    pub user_id: i32,
    pub answers: AnswerMap,
    pub is_draft: bool,
    /// Submission time for final responses; doubles as "last saved" while
    /// the row is still a draft.
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResponseInsertion {
    pub form_id: i32,
    pub user_id: i32,
    pub answers: AnswerMap,
    pub is_draft: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::form::MAX_RATING_SCALE;

    fn question(kind: QuestionType) -> Question {
        Question {
            id: "q".into(),
            title: "Q".into(),
            kind,
            required: false,
            choices: vec!["red".into(), "green".into()],
            multiple: false,
            scale: 5,
        }
    }

    #[test]
    fn emptiness_per_variant() {
        assert!(AnswerValue::Text("  ".into()).is_empty());
        assert!(!AnswerValue::Text("hi".into()).is_empty());
        assert!(!AnswerValue::Number(0.0).is_empty());
        assert!(AnswerValue::List(vec![]).is_empty());
    }

    #[test]
    fn rating_bounds_follow_the_question_scale() {
        let q = question(QuestionType::Rating);
        assert!(AnswerValue::Number(5.0).check(&q).is_ok());
        assert!(AnswerValue::Number(6.0).check(&q).is_err());
        assert!(AnswerValue::Number(0.0).check(&q).is_err());
        assert!(AnswerValue::Text("5".into()).check(&q).is_err());
    }

    #[test]
    fn multiple_choice_checks_membership_and_arity() {
        let mut q = question(QuestionType::MultipleChoice);
        assert!(AnswerValue::Text("red".into()).check(&q).is_ok());
        assert!(AnswerValue::Text("blue".into()).check(&q).is_err());
        assert!(AnswerValue::List(vec!["red".into()]).check(&q).is_err());

        q.multiple = true;
        assert!(AnswerValue::List(vec!["red".into(), "green".into()]).check(&q).is_ok());
        assert!(AnswerValue::List(vec!["blue".into()]).check(&q).is_err());
        assert!(AnswerValue::Text("red".into()).check(&q).is_err());
    }

    #[test]
    fn text_like_questions_take_strings() {
        for kind in [QuestionType::Text, QuestionType::Textarea, QuestionType::Image, QuestionType::File] {
            let q = question(kind);
            assert!(AnswerValue::Text("something".into()).check(&q).is_ok());
            assert!(AnswerValue::Number(1.0).check(&q).is_err());
        }
    }

    #[test]
    fn answers_serialize_as_plain_json_values() {
        let mut answers = AnswerMap::new();
        answers.insert("mood".into(), AnswerValue::Number(MAX_RATING_SCALE as f64));
        answers.insert("note".into(), AnswerValue::Text("fine".into()));
        answers.insert("tags".into(), AnswerValue::List(vec!["a".into()]));
        let json = serde_json::to_value(&answers).unwrap();
        assert_eq!(json["mood"], 10.0);
        assert_eq!(json["note"], "fine");
        assert_eq!(json["tags"][0], "a");
    }
}
