use std::future::{ready, Ready};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::HttpMessage;
use chrono::Utc;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::context::UserInfo;
use crate::error::Error;

pub static JWT_COOKIE: &str = "synccircle_token";
pub static JWT_SECRET: &str = "JWT_SECRET";

#[derive(Debug, Deserialize, Serialize)]
pub struct Claim {
    pub user: String,
    pub exp: i64,
}

pub fn issue_token(secret: &[u8], user_id: i32) -> Result<String, Error> {
    let claim = Claim {
        user: user_id.to_string(),
        exp: (Utc::now() + chrono::Duration::days(30)).timestamp(),
    };
    Ok(encode(&Header::default(), &claim, &EncodingKey::from_secret(secret))?)
}

pub fn verify_token(secret: &[u8], token: &str) -> Result<Claim, Error> {
    Ok(decode::<Claim>(token, &DecodingKey::from_secret(secret), &Validation::default())?.claims)
}

/// Resolves the caller's bearer token (or the auth cookie) into a
/// [`UserInfo`] request extension.
pub struct Jwt {
    secret: Vec<u8>,
}

impl Jwt {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl<S, B: 'static> Transform<S, ServiceRequest> for Jwt
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = JwtMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddleware {
            secret: self.secret.clone(),
            service,
        }))
    }
}

pub struct JwtMiddleware<S> {
    secret: Vec<u8>,
    service: S,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(raw) = value.to_str() {
            return Some(raw.strip_prefix("Bearer ").unwrap_or(raw).to_owned());
        }
    }
    req.cookie(JWT_COOKIE).map(|c| c.value().to_owned())
}

impl<S, B: 'static> Service<ServiceRequest> for JwtMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(token) = bearer_token(&req) else {
            return Box::pin(ready(Err(Error::Unauthorized("missing credentials".into()).into())));
        };
        let claim = match verify_token(&self.secret, &token) {
            Ok(claim) => claim,
            Err(_) => return Box::pin(ready(Err(Error::Unauthorized("invalid token".into()).into()))),
        };
        let Ok(id) = claim.user.parse::<i32>() else {
            return Box::pin(ready(Err(Error::Unauthorized("malformed token subject".into()).into())));
        };
        req.extensions_mut().insert(UserInfo { id });
        Box::pin(self.service.call(req))
    }
}
