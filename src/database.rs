use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::{query_as, query_scalar, FromRow, PgPool, Postgres};

use crate::core::ports::ResponseStore;
use crate::error::Error;
use crate::models::form::{Form, Question, Recurrence};
use crate::models::response::{AnswerMap, Response, ResponseInsertion};
use crate::models::space::MemberRole;

/// Postgres-backed [`ResponseStore`] over one pooled connection.
pub struct PgStore {
    conn: PoolConnection<Postgres>,
}

impl PgStore {
    pub async fn acquire(pool: &PgPool) -> Result<Self, Error> {
        Ok(Self {
            conn: pool.acquire().await?,
        })
    }
}

/// Row shape of `forms`: question definitions live in a JSONB column and
/// unwrap into the plain model at the storage boundary.
#[derive(Debug, FromRow)]
pub(crate) struct FormRow {
    id: i32,
    space_id: i32,
    title: String,
    recurrence: Recurrence,
    questions: Json<Vec<Question>>,
    created_by: i32,
    created_at: DateTime<Utc>,
}

impl From<FormRow> for Form {
    fn from(row: FormRow) -> Self {
        Form {
            id: row.id,
            space_id: row.space_id,
            title: row.title,
            recurrence: row.recurrence,
            questions: row.questions.0,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

pub(crate) const FORM_COLUMNS: &str = "id, space_id, title, recurrence, questions, created_by, created_at";

#[derive(Debug, FromRow)]
struct ResponseRow {
    id: i32,
    form_id: i32,
    user_id: i32,
    answers: Json<AnswerMap>,
    is_draft: bool,
    submitted_at: DateTime<Utc>,
}

impl From<ResponseRow> for Response {
    fn from(row: ResponseRow) -> Self {
        Response {
            id: row.id,
            form_id: row.form_id,
            user_id: row.user_id,
            answers: row.answers.0,
            is_draft: row.is_draft,
            submitted_at: row.submitted_at,
        }
    }
}

const RESPONSE_COLUMNS: &str = "id, form_id, user_id, answers, is_draft, submitted_at";

impl ResponseStore for PgStore {
    async fn form(&mut self, form_id: i32) -> Result<Option<Form>, Error> {
        let row: Option<FormRow> = query_as(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"))
            .bind(form_id)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn member_role(&mut self, space_id: i32, user_id: i32) -> Result<Option<MemberRole>, Error> {
        Ok(query_scalar(
            "SELECT role
            FROM space_members
            WHERE space_id = $1 AND user_id = $2",
        )
        .bind(space_id)
        .bind(user_id)
        .fetch_optional(&mut self.conn)
        .await?)
    }

    async fn member_count(&mut self, space_id: i32) -> Result<i64, Error> {
        Ok(query_scalar("SELECT COUNT(*) FROM space_members WHERE space_id = $1")
            .bind(space_id)
            .fetch_one(&mut self.conn)
            .await?)
    }

    async fn get(&mut self, id: i32) -> Result<Option<Response>, Error> {
        let row: Option<ResponseRow> = query_as(&format!("SELECT {RESPONSE_COLUMNS} FROM responses WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn latest_draft(&mut self, form_id: i32, user_id: i32) -> Result<Option<Response>, Error> {
        let row: Option<ResponseRow> = query_as(&format!(
            "SELECT {RESPONSE_COLUMNS}
            FROM responses
            WHERE form_id = $1 AND user_id = $2 AND is_draft
            ORDER BY submitted_at DESC, id DESC
            LIMIT 1"
        ))
        .bind(form_id)
        .bind(user_id)
        .fetch_optional(&mut self.conn)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn insert(&mut self, data: ResponseInsertion) -> Result<Response, Error> {
        let row: ResponseRow = query_as(&format!(
            "INSERT INTO responses (form_id, user_id, answers, is_draft)
            VALUES ($1, $2, $3, $4)
            RETURNING {RESPONSE_COLUMNS}"
        ))
        .bind(data.form_id)
        .bind(data.user_id)
        .bind(Json(data.answers))
        .bind(data.is_draft)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(row.into())
    }

    async fn update(&mut self, id: i32, answers: &AnswerMap, is_draft: bool) -> Result<Response, Error> {
        let row: ResponseRow = query_as(&format!(
            "UPDATE responses
            SET answers = $1, is_draft = $2, submitted_at = NOW()
            WHERE id = $3
            RETURNING {RESPONSE_COLUMNS}"
        ))
        .bind(Json(answers.clone()))
        .bind(is_draft)
        .bind(id)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(row.into())
    }

    async fn list_submitted(&mut self, form_id: i32) -> Result<Vec<Response>, Error> {
        let rows: Vec<ResponseRow> = query_as(&format!(
            "SELECT {RESPONSE_COLUMNS}
            FROM responses
            WHERE form_id = $1 AND NOT is_draft
            ORDER BY submitted_at DESC, id DESC"
        ))
        .bind(form_id)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
