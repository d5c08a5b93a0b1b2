use actix_web::web::{Data, Json, Path};
use sqlx::types::Json as SqlJson;
use sqlx::{query, query_as, query_scalar, PgPool};

use crate::context::UserInfo;
use crate::core::services::response::{self as response_service, ResponseReport};
use crate::database::{FormRow, PgStore, FORM_COLUMNS};
use crate::error::Error;
use crate::handlers::space::require_admin;
use crate::models::form::{validate_questions, Form, FormInsertion};
use crate::models::response::Response;
use crate::response::{CreateResponse, DeleteResponse, List};

pub async fn create(user_info: UserInfo, space_id: Path<(i32,)>, Json(form): Json<FormInsertion>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    let space_id = space_id.into_inner().0;
    if form.title.trim().is_empty() {
        return Err(Error::Validation("form title must not be empty".into()));
    }
    validate_questions(&form.questions).map_err(Error::Validation)?;
    let mut conn = db.acquire().await?;
    require_admin(&mut conn, space_id, user_info.id).await?;
    let (id,): (i32,) = query_as(
        "INSERT INTO forms (space_id, title, recurrence, questions, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id",
    )
    .bind(space_id)
    .bind(form.title)
    .bind(form.recurrence)
    .bind(SqlJson(form.questions))
    .bind(user_info.id)
    .fetch_one(&mut conn)
    .await?;
    Ok(Json(CreateResponse { id }))
}

pub async fn list(space_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<List<Form>>, Error> {
    let space_id = space_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let rows: Vec<FormRow> = query_as(&format!(
        "SELECT {FORM_COLUMNS}
        FROM forms
        WHERE space_id = $1
        ORDER BY created_at DESC, id DESC"
    ))
    .bind(space_id)
    .fetch_all(&mut conn)
    .await?;
    let forms: Vec<Form> = rows.into_iter().map(Into::into).collect();
    let total = forms.len() as i64;
    Ok(Json(List::new(forms, total)))
}

pub async fn detail(form_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<Form>, Error> {
    let form_id = form_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let row: FormRow = query_as(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"))
        .bind(form_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("form {form_id} does not exist")))?;
    Ok(Json(Form::from(row)))
}

pub async fn delete_form(user_info: UserInfo, form_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<DeleteResponse>, Error> {
    let form_id = form_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let space_id: i32 = query_scalar("SELECT space_id FROM forms WHERE id = $1")
        .bind(form_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("form {form_id} does not exist")))?;
    require_admin(&mut conn, space_id, user_info.id).await?;
    let deleted = query("DELETE FROM forms WHERE id = $1")
        .bind(form_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
    Ok(Json(DeleteResponse::new(deleted)))
}

/// The caller's current draft for this form, or null.
pub async fn my_response(user_info: UserInfo, form_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<Option<Response>>, Error> {
    let mut store = PgStore::acquire(&db).await?;
    let draft = response_service::my_response(&mut store, user_info.id, form_id.into_inner().0).await?;
    Ok(Json(draft))
}

/// Admin report: all submitted responses plus aggregate stats.
pub async fn responses(user_info: UserInfo, form_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<ResponseReport>, Error> {
    let mut store = PgStore::acquire(&db).await?;
    let report = response_service::list_responses(&mut store, user_info.id, form_id.into_inner().0).await?;
    Ok(Json(report))
}
