pub mod form;
pub mod response;
pub mod space;
pub mod user;

use actix_web::cookie::time::OffsetDateTime;
use actix_web::cookie::{Cookie, CookieBuilder};
use actix_web::http::StatusCode;
use actix_web::web::{Data, Json};
use actix_web::{HttpResponse, HttpResponseBuilder};
use hex::ToHex;
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{query_as, PgPool};

use crate::error::Error;
use crate::middlewares::jwt::{issue_token, JWT_COOKIE, JWT_SECRET};
use crate::models::user::User;
use crate::response::CreateResponse;

fn hash_password(pass: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pass);
    hasher.update(salt);
    hasher.finalize().encode_hex()
}

fn random_salt() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 32)
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    token: String,
}

pub async fn login(Json(Login { email, password }): Json<Login>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    let mut conn = db.acquire().await?;
    let user = query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::Unauthorized("invalid email or password".into()))?;
    if hash_password(&password, &user.salt) != user.password {
        return Err(Error::Unauthorized("invalid email or password".into()));
    }
    let secret = dotenv::var(JWT_SECRET)?;
    let token = issue_token(secret.as_bytes(), user.id)?;
    Ok(HttpResponse::build(StatusCode::OK)
        .cookie(Cookie::new(JWT_COOKIE, token.clone()))
        .json(TokenResponse { token }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signup {
    nickname: String,
    email: String,
    password: String,
}

pub async fn signup(Json(Signup { nickname, email, password }): Json<Signup>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    if nickname.trim().is_empty() || email.trim().is_empty() {
        return Err(Error::Validation("nickname and email must not be empty".into()));
    }
    if password.len() < 8 {
        return Err(Error::Validation("password must be at least 8 characters".into()));
    }
    let mut tx = db.begin().await?;
    let (taken,): (bool,) = query_as("SELECT EXISTS(SELECT id FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut tx)
        .await?;
    if taken {
        return Err(Error::Validation("email already registered".into()));
    }
    let salt = random_salt();
    let (id,): (i32,) = query_as("INSERT INTO users (nickname, email, password, salt) VALUES ($1, $2, $3, $4) RETURNING id")
        .bind(nickname)
        .bind(email)
        .bind(hash_password(&password, &salt))
        .bind(salt)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(Json(CreateResponse { id }))
}

pub async fn logout() -> HttpResponse {
    HttpResponseBuilder::new(StatusCode::OK)
        .cookie(CookieBuilder::new(JWT_COOKIE, "").expires(OffsetDateTime::now_utc()).finish())
        .finish()
}
