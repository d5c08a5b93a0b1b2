use crate::error::Error;
use crate::models::form::Form;
use crate::models::response::{AnswerMap, Response, ResponseInsertion};
use crate::models::space::MemberRole;

/// Storage seam for the response lifecycle. The production implementation
/// is [`crate::database::PgStore`]; service tests run against an in-memory
/// one.
pub trait ResponseStore {
    async fn form(&mut self, form_id: i32) -> Result<Option<Form>, Error>;
    async fn member_role(&mut self, space_id: i32, user_id: i32) -> Result<Option<MemberRole>, Error>;
    async fn member_count(&mut self, space_id: i32) -> Result<i64, Error>;
    async fn get(&mut self, id: i32) -> Result<Option<Response>, Error>;
    /// The most recent draft row for (form, user): ordered by submission
    /// timestamp with the id breaking ties.
    async fn latest_draft(&mut self, form_id: i32, user_id: i32) -> Result<Option<Response>, Error>;
    async fn insert(&mut self, data: ResponseInsertion) -> Result<Response, Error>;
    async fn update(&mut self, id: i32, answers: &AnswerMap, is_draft: bool) -> Result<Response, Error>;
    /// All non-draft responses for a form, newest first.
    async fn list_submitted(&mut self, form_id: i32) -> Result<Vec<Response>, Error>;
}
