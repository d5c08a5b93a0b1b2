use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::ports::ResponseStore;
use crate::core::stats::{self, ResponseSummary};
use crate::error::Error;
use crate::models::form::{Form, Question};
use crate::models::response::{AnswerMap, Response, ResponseInsertion};
use crate::models::space::MemberRole;

#[derive(Debug, Clone, Deserialize)]
pub struct SaveRequest {
    pub form_id: i32,
    pub answers: AnswerMap,
    pub is_draft: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub answers: AnswerMap,
    pub is_draft: bool,
}

#[derive(Debug, Serialize)]
pub struct ResponseReport {
    pub responses: Vec<Response>,
    pub summary: ResponseSummary,
}

/// Required questions with no non-empty answer yet. Shared by the submit
/// paths on both sides of the lifecycle.
pub fn missing_required<'q>(questions: &'q [Question], answers: &AnswerMap) -> Vec<&'q Question> {
    questions
        .iter()
        .filter(|q| q.required && answers.get(&q.id).map_or(true, |v| v.is_empty()))
        .collect()
}

fn check_required(questions: &[Question], answers: &AnswerMap) -> Result<(), Error> {
    let missing = missing_required(questions, answers);
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Validation(format!(
        "required questions unanswered: {}",
        missing.iter().map(|q| q.title.as_str()).join(", ")
    )))
}

fn check_types(questions: &[Question], answers: &AnswerMap) -> Result<(), Error> {
    for (qid, value) in answers {
        let question = questions
            .iter()
            .find(|q| q.id == *qid)
            .ok_or_else(|| Error::Validation(format!("unknown question id {qid}")))?;
        value.check(question).map_err(Error::Validation)?;
    }
    Ok(())
}

async fn member_form<S>(store: &mut S, user_id: i32, form_id: i32) -> Result<(Form, MemberRole), Error>
where
    S: ResponseStore,
{
    let form = store
        .form(form_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("form {form_id} does not exist")))?;
    let role = store
        .member_role(form.space_id, user_id)
        .await?
        .ok_or_else(|| Error::Forbidden("not a member of this space".into()))?;
    Ok((form, role))
}

/// The upsert behind `POST /api/responses`. Final submissions always
/// insert, keeping one historical row per submission; draft saves collapse
/// into the caller's most recent draft row.
pub async fn save_response<S>(store: &mut S, user_id: i32, req: SaveRequest) -> Result<Response, Error>
where
    S: ResponseStore,
{
    let (form, _) = member_form(store, user_id, req.form_id).await?;
    check_types(&form.questions, &req.answers)?;
    if !req.is_draft {
        check_required(&form.questions, &req.answers)?;
        return store
            .insert(ResponseInsertion {
                form_id: req.form_id,
                user_id,
                answers: req.answers,
                is_draft: false,
            })
            .await;
    }
    match store.latest_draft(req.form_id, user_id).await? {
        Some(existing) => store.update(existing.id, &req.answers, true).await,
        None => {
            store
                .insert(ResponseInsertion {
                    form_id: req.form_id,
                    user_id,
                    answers: req.answers,
                    is_draft: true,
                })
                .await
        }
    }
}

/// In-place update of one row, addressed by id: draft auto-saves while
/// editing, and the final "update" submission.
pub async fn update_response<S>(store: &mut S, user_id: i32, id: i32, req: UpdateRequest) -> Result<Response, Error>
where
    S: ResponseStore,
{
    let existing = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("response {id} does not exist")))?;
    if existing.user_id != user_id {
        return Err(Error::Forbidden("only the author can modify a response".into()));
    }
    let (form, _) = member_form(store, user_id, existing.form_id).await?;
    check_types(&form.questions, &req.answers)?;
    if !req.is_draft {
        check_required(&form.questions, &req.answers)?;
    }
    store.update(id, &req.answers, req.is_draft).await
}

/// The caller's current draft for a form, or None.
pub async fn my_response<S>(store: &mut S, user_id: i32, form_id: i32) -> Result<Option<Response>, Error>
where
    S: ResponseStore,
{
    member_form(store, user_id, form_id).await?;
    store.latest_draft(form_id, user_id).await
}

/// One response by id; visible to its author and to space admins.
pub async fn get_response<S>(store: &mut S, user_id: i32, id: i32) -> Result<Response, Error>
where
    S: ResponseStore,
{
    let response = store
        .get(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("response {id} does not exist")))?;
    if response.user_id == user_id {
        return Ok(response);
    }
    let (_, role) = member_form(store, user_id, response.form_id).await?;
    if role != MemberRole::Admin {
        return Err(Error::Forbidden("only the author or a space admin can view this response".into()));
    }
    Ok(response)
}

/// Admin view: all submitted responses plus the aggregation summary.
pub async fn list_responses<S>(store: &mut S, user_id: i32, form_id: i32) -> Result<ResponseReport, Error>
where
    S: ResponseStore,
{
    let (form, role) = member_form(store, user_id, form_id).await?;
    if role != MemberRole::Admin {
        return Err(Error::Forbidden("admin role required".into()));
    }
    let responses = store.list_submitted(form_id).await?;
    let members = store.member_count(form.space_id).await?;
    let summary = stats::summarize(&responses, members);
    Ok(ResponseReport { responses, summary })
}
