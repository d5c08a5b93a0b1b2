use sqlx::PgPool;

use crate::core::draft::ResponseApi;
use crate::core::services::response::{self, SaveRequest, UpdateRequest};
use crate::database::PgStore;
use crate::error::Error;
use crate::models::response::{AnswerMap, Response};

/// In-process [`ResponseApi`] for driving a [`crate::core::draft::DraftController`]
/// against the same service layer the HTTP handlers use. Useful for bots
/// and scripted check-ins that run inside the backend process.
#[derive(Clone)]
pub struct PgResponseApi {
    pool: PgPool,
    user_id: i32,
}

impl PgResponseApi {
    pub fn new(pool: PgPool, user_id: i32) -> Self {
        Self { pool, user_id }
    }
}

impl ResponseApi for PgResponseApi {
    async fn save_draft(&self, form_id: i32, answers: &AnswerMap) -> Result<Response, Error> {
        let mut store = PgStore::acquire(&self.pool).await?;
        response::save_response(
            &mut store,
            self.user_id,
            SaveRequest {
                form_id,
                answers: answers.clone(),
                is_draft: true,
            },
        )
        .await
    }

    async fn submit(&self, form_id: i32, answers: &AnswerMap) -> Result<Response, Error> {
        let mut store = PgStore::acquire(&self.pool).await?;
        response::save_response(
            &mut store,
            self.user_id,
            SaveRequest {
                form_id,
                answers: answers.clone(),
                is_draft: false,
            },
        )
        .await
    }

    async fn update(&self, response_id: i32, answers: &AnswerMap, is_draft: bool) -> Result<Response, Error> {
        let mut store = PgStore::acquire(&self.pool).await?;
        response::update_response(
            &mut store,
            self.user_id,
            response_id,
            UpdateRequest {
                answers: answers.clone(),
                is_draft,
            },
        )
        .await
    }

    async fn my_draft(&self, form_id: i32) -> Result<Option<Response>, Error> {
        let mut store = PgStore::acquire(&self.pool).await?;
        response::my_response(&mut store, self.user_id, form_id).await
    }

    async fn response(&self, response_id: i32) -> Result<Response, Error> {
        let mut store = PgStore::acquire(&self.pool).await?;
        response::get_response(&mut store, self.user_id, response_id).await
    }
}
