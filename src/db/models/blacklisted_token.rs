use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use uuid::Uuid;

use crate::db::schema::token_blacklist;

pub const REASON_LOGOUT: &str = "logout";
pub const REASON_REVOKED: &str = "revoked";

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = token_blacklist)]
pub struct NewBlacklistedToken {
    pub jti: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = token_blacklist)]
pub struct BlacklistedToken {
    pub id: Uuid,
    pub jti: String,
    pub user_id: Uuid,
    pub blacklisted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}
