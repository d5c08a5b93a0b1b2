use actix_web::web::{Data, Json, Path, Query};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, query_scalar, PgConnection, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::context::UserInfo;
use crate::error::Error;
use crate::models::space::{Member, MemberRole, Space, SpaceSummary};
use crate::request::Pagination;
use crate::response::{CreateResponse, DeleteResponse, List, UpdateResponse};

/// Admin gate shared by the space- and form-management handlers. The
/// route-level Access middleware only proves membership; role checks stay
/// next to the statements they guard.
pub(crate) async fn require_admin(conn: &mut PgConnection, space_id: i32, user_id: i32) -> Result<(), Error> {
    let role: Option<MemberRole> = query_scalar("SELECT role FROM space_members WHERE space_id = $1 AND user_id = $2")
        .bind(space_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    match role {
        Some(MemberRole::Admin) => Ok(()),
        Some(MemberRole::Member) => Err(Error::Forbidden("admin role required".into())),
        None => Err(Error::Forbidden("not a member of this space".into())),
    }
}

fn new_invite_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(8);
    code
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceCreation {
    name: String,
}

pub async fn create(user_info: UserInfo, Json(SpaceCreation { name }): Json<SpaceCreation>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    if name.trim().is_empty() {
        return Err(Error::Validation("space name must not be empty".into()));
    }
    let mut tx = db.begin().await?;
    let (id,): (i32,) = query_as("INSERT INTO spaces (name, invite_code) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(new_invite_code())
        .fetch_one(&mut tx)
        .await?;
    query("INSERT INTO space_members (space_id, user_id, role) VALUES ($1, $2, 'admin')")
        .bind(id)
        .bind(user_info.id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(Json(CreateResponse { id }))
}

pub async fn list(user_info: UserInfo, Query(Pagination { page, size }): Query<Pagination>, db: Data<PgPool>) -> Result<Json<List<SpaceSummary>>, Error> {
    let mut conn = db.acquire().await?;
    let (total,): (i64,) = query_as("SELECT COUNT(*) FROM space_members WHERE user_id = $1")
        .bind(user_info.id)
        .fetch_one(&mut conn)
        .await?;
    let spaces: Vec<SpaceSummary> = query_as(
        "SELECT
            s.id,
            s.name,
            s.invite_code,
            sm.role,
            (SELECT COUNT(*) FROM forms AS f WHERE f.space_id = s.id) AS form_count,
            (SELECT COUNT(*) FROM space_members AS m WHERE m.space_id = s.id) AS member_count
        FROM spaces AS s
        JOIN space_members AS sm ON s.id = sm.space_id
        WHERE sm.user_id = $1
        ORDER BY s.id
        LIMIT $2
        OFFSET $3",
    )
    .bind(user_info.id)
    .bind(size)
    .bind((page - 1) * size)
    .fetch_all(&mut conn)
    .await?;
    Ok(Json(List::new(spaces, total)))
}

#[derive(Debug, Serialize)]
pub struct SpaceDetail {
    space: Space,
    members: Vec<Member>,
}

pub async fn detail(space_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<SpaceDetail>, Error> {
    let space_id = space_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let space: Space = query_as("SELECT id, name, invite_code, created_at FROM spaces WHERE id = $1")
        .bind(space_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("space {space_id} does not exist")))?;
    let members: Vec<Member> = query_as(
        "SELECT sm.user_id, u.nickname, sm.role
        FROM space_members AS sm
        JOIN users AS u ON sm.user_id = u.id
        WHERE sm.space_id = $1
        ORDER BY u.nickname",
    )
    .bind(space_id)
    .fetch_all(&mut conn)
    .await?;
    Ok(Json(SpaceDetail { space, members }))
}

#[derive(Debug, Deserialize)]
pub struct SpaceUpdate {
    name: String,
}

pub async fn update(user_info: UserInfo, space_id: Path<(i32,)>, Json(SpaceUpdate { name }): Json<SpaceUpdate>, db: Data<PgPool>) -> Result<Json<UpdateResponse>, Error> {
    let space_id = space_id.into_inner().0;
    if name.trim().is_empty() {
        return Err(Error::Validation("space name must not be empty".into()));
    }
    let mut conn = db.acquire().await?;
    require_admin(&mut conn, space_id, user_info.id).await?;
    let updated = query("UPDATE spaces SET name = $1 WHERE id = $2")
        .bind(name)
        .bind(space_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
    Ok(Json(UpdateResponse::new(updated)))
}

pub async fn delete_space(user_info: UserInfo, space_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<DeleteResponse>, Error> {
    let space_id = space_id.into_inner().0;
    let mut conn = db.acquire().await?;
    require_admin(&mut conn, space_id, user_info.id).await?;
    let deleted = query("DELETE FROM spaces WHERE id = $1")
        .bind(space_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
    Ok(Json(DeleteResponse::new(deleted)))
}

pub async fn add_members(user_info: UserInfo, space_id: Path<(i32,)>, Json(user_ids): Json<Vec<i32>>, db: Data<PgPool>) -> Result<Json<()>, Error> {
    let space_id = space_id.into_inner().0;
    if user_ids.is_empty() {
        return Ok(Json(()));
    }
    let mut tx = db.begin().await?;
    require_admin(&mut tx, space_id, user_info.id).await?;
    let (found,): (i64,) = query_as("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
        .bind(&user_ids)
        .fetch_one(&mut tx)
        .await?;
    if found != user_ids.len() as i64 {
        return Err(Error::NotFound("one or more users do not exist".into()));
    }
    QueryBuilder::new("INSERT INTO space_members (space_id, user_id, role) ")
        .push_values(user_ids.iter(), |mut b, uid| {
            b.push_bind(space_id);
            b.push_bind(uid);
            b.push_bind(MemberRole::Member);
        })
        .push(" ON CONFLICT (space_id, user_id) DO NOTHING")
        .build()
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(Json(()))
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    invite_code: String,
}

pub async fn join(user_info: UserInfo, Json(JoinRequest { invite_code }): Json<JoinRequest>, db: Data<PgPool>) -> Result<Json<Space>, Error> {
    let mut tx = db.begin().await?;
    let space: Space = query_as("SELECT id, name, invite_code, created_at FROM spaces WHERE invite_code = $1")
        .bind(&invite_code)
        .fetch_optional(&mut tx)
        .await?
        .ok_or_else(|| Error::NotFound("no space with this invite code".into()))?;
    query("INSERT INTO space_members (space_id, user_id, role) VALUES ($1, $2, 'member') ON CONFLICT (space_id, user_id) DO NOTHING")
        .bind(space.id)
        .bind(user_info.id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(Json(space))
}
