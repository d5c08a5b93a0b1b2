use actix_web::web::{Data, Json, Query};
use serde::Deserialize;
use sqlx::{query_as, PgPool};

use crate::error::Error;
use crate::models::user::UserItem;
use crate::response::List;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    20
}

// member picker: match nickname or email fragments
pub async fn search(Query(SearchParams { q, page, size }): Query<SearchParams>, db: Data<PgPool>) -> Result<Json<List<UserItem>>, Error> {
    let mut conn = db.acquire().await?;
    let pattern = format!("%{q}%");
    let (total,): (i64,) = query_as("SELECT COUNT(*) FROM users WHERE nickname ILIKE $1 OR email ILIKE $1")
        .bind(&pattern)
        .fetch_one(&mut conn)
        .await?;
    let list: Vec<UserItem> = query_as(
        "SELECT id, nickname, email
        FROM users
        WHERE nickname ILIKE $1 OR email ILIKE $1
        ORDER BY nickname
        LIMIT $2
        OFFSET $3",
    )
    .bind(&pattern)
    .bind(size)
    .bind((page - 1) * size)
    .fetch_all(&mut conn)
    .await?;
    Ok(Json(List::new(list, total)))
}
