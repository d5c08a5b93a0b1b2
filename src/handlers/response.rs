use actix_web::web::{Data, Json, Path};
use sqlx::PgPool;

use crate::context::UserInfo;
use crate::core::services::response::{self as service, SaveRequest, UpdateRequest};
use crate::database::PgStore;
use crate::error::Error;
use crate::models::response::Response;

/// `POST /api/responses` — draft upsert, or a final submission when
/// `is_draft` is false (which always creates a new row).
pub async fn create(user_info: UserInfo, Json(req): Json<SaveRequest>, db: Data<PgPool>) -> Result<Json<Response>, Error> {
    let mut store = PgStore::acquire(&db).await?;
    let saved = service::save_response(&mut store, user_info.id, req).await?;
    Ok(Json(saved))
}

/// `PUT /api/responses/{response_id}` — in-place update of one row, used
/// both for auto-saves while editing and for the final update.
pub async fn update(user_info: UserInfo, response_id: Path<(i32,)>, Json(req): Json<UpdateRequest>, db: Data<PgPool>) -> Result<Json<Response>, Error> {
    let mut store = PgStore::acquire(&db).await?;
    let updated = service::update_response(&mut store, user_info.id, response_id.into_inner().0, req).await?;
    Ok(Json(updated))
}

pub async fn detail(user_info: UserInfo, response_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<Response>, Error> {
    let mut store = PgStore::acquire(&db).await?;
    let response = service::get_response(&mut store, user_info.id, response_id.into_inner().0).await?;
    Ok(Json(response))
}
