use std::future::{ready, Ready};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorBadRequest;
use actix_web::HttpMessage;
use futures_util::future::LocalBoxFuture;
use sqlx::{query_scalar, PgPool};

use crate::context::UserInfo;
use crate::error::Error;

/// Scope-mounted membership guard: runs an EXISTS query binding the caller
/// id and one path argument, and rejects with Forbidden when it comes back
/// false. Mount below [`crate::middlewares::jwt::Jwt`].
pub struct Access {
    db: PgPool,
    check_stmt: String,
    path_arg_name: String,
}

impl Access {
    pub fn new(db: PgPool, check_stmt: &str, path_arg_name: &str) -> Self {
        Self {
            db,
            check_stmt: check_stmt.into(),
            path_arg_name: path_arg_name.into(),
        }
    }
}

impl<S, B: 'static> Transform<S, ServiceRequest> for Access
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AccessMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessMiddleware {
            db: self.db.clone(),
            check_stmt: self.check_stmt.clone(),
            path_arg_name: self.path_arg_name.clone(),
            service,
        }))
    }
}

pub struct AccessMiddleware<S> {
    db: PgPool,
    check_stmt: String,
    path_arg_name: String,
    service: S,
}

impl<S, B: 'static> Service<ServiceRequest> for AccessMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(user) = req.extensions().get::<UserInfo>().cloned() else {
            return Box::pin(ready(Err(Error::Unauthorized("no authenticated user".into()).into())));
        };
        let Some(id) = req.match_info().get(&self.path_arg_name).and_then(|v| v.parse::<i32>().ok()) else {
            return Box::pin(ready(Err(ErrorBadRequest("invalid path id"))));
        };
        let stmt = self.check_stmt.clone();
        let db = self.db.clone();
        let next = self.service.call(req);
        Box::pin(async move {
            let allowed: bool = query_scalar(&stmt)
                .bind(user.id)
                .bind(id)
                .fetch_one(&mut db.acquire().await.map_err(Error::from)?)
                .await
                .map_err(Error::from)?;
            if !allowed {
                return Err(Error::Forbidden("no access to this resource".into()).into());
            }
            next.await
        })
    }
}
