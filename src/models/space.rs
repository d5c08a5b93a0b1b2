use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(sqlx::Type)]
#[sqlx(type_name = "member_role")]
#[sqlx(rename_all = "lowercase")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Space {
    pub id: i32,
    pub name: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SpaceSummary {
    pub id: i32,
    pub name: String,
    pub invite_code: String,
    pub role: MemberRole,
    pub form_count: i64,
    pub member_count: i64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Member {
    pub user_id: i32,
    pub nickname: String,
    pub role: MemberRole,
}
