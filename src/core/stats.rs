use serde::Serialize;

use crate::models::response::Response;

/// Aggregation over a form's submitted responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSummary {
    pub total: i64,
    /// Responses over space members, rounded to the nearest percent; zero
    /// when the space has no members.
    pub completion_rate: i32,
    /// Mean of all numeric answers in 1..=10, rounded to one decimal;
    /// absent when no response carries a rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

pub fn summarize(responses: &[Response], member_count: i64) -> ResponseSummary {
    let total = responses.len() as i64;
    let completion_rate = if member_count > 0 {
        ((total as f64 / member_count as f64) * 100.0).round() as i32
    } else {
        0
    };
    let ratings: Vec<f64> = responses
        .iter()
        .flat_map(|r| r.answers.values())
        .filter_map(|v| v.as_number())
        .filter(|n| (1.0..=10.0).contains(n))
        .collect();
    let average_rating = if ratings.is_empty() {
        None
    } else {
        let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    };
    ResponseSummary {
        total,
        completion_rate,
        average_rating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::{AnswerMap, AnswerValue};
    use chrono::{TimeZone, Utc};

    fn response(id: i32, answers: AnswerMap) -> Response {
        Response {
            id,
            form_id: 1,
            user_id: id,
            answers,
            is_draft: false,
            submitted_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
        }
    }

    fn with_rating(id: i32, rating: f64) -> Response {
        let mut answers = AnswerMap::new();
        answers.insert("mood".into(), AnswerValue::Number(rating));
        response(id, answers)
    }

    #[test]
    fn two_of_four_members_is_fifty_percent() {
        let responses = vec![response(1, AnswerMap::new()), response(2, AnswerMap::new())];
        let summary = summarize(&responses, 4);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completion_rate, 50);
        assert_eq!(summary.average_rating, None);
    }

    #[test]
    fn no_members_means_zero_completion() {
        let responses = vec![response(1, AnswerMap::new())];
        assert_eq!(summarize(&responses, 0).completion_rate, 0);
    }

    #[test]
    fn completion_rounds_to_nearest_percent() {
        let responses = vec![response(1, AnswerMap::new())];
        assert_eq!(summarize(&responses, 3).completion_rate, 33);
        let responses = vec![response(1, AnswerMap::new()), response(2, AnswerMap::new())];
        assert_eq!(summarize(&responses, 3).completion_rate, 67);
    }

    #[test]
    fn average_rating_rounds_to_one_decimal() {
        let responses = vec![with_rating(1, 7.0), with_rating(2, 8.0), with_rating(3, 8.0)];
        assert_eq!(summarize(&responses, 3).average_rating, Some(7.7));
    }

    #[test]
    fn only_numbers_in_rating_range_count() {
        let mut answers = AnswerMap::new();
        answers.insert("mood".into(), AnswerValue::Number(6.0));
        answers.insert("age".into(), AnswerValue::Number(42.0));
        answers.insert("note".into(), AnswerValue::Text("7".into()));
        let summary = summarize(&[response(1, answers)], 1);
        assert_eq!(summary.average_rating, Some(6.0));
    }
}
