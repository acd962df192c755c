use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::error::RepositoryError;
use crate::db::models::blacklisted_token::NewBlacklistedToken;
use crate::db::schema::token_blacklist;

pub struct BlacklistRepository;

impl BlacklistRepository {
    /// Returns false when the token id was already listed.
    pub fn insert(
        conn: &mut PgConnection,
        entry: &NewBlacklistedToken,
    ) -> Result<bool, RepositoryError> {
        let inserted = diesel::insert_into(token_blacklist::table)
            .values(entry)
            .on_conflict(token_blacklist::jti)
            .do_nothing()
            .execute(conn)?;

        Ok(inserted > 0)
    }

    /// Entries past their expiry no longer count: the token itself is dead.
    pub fn exists(
        conn: &mut PgConnection,
        jti: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        diesel::select(diesel::dsl::exists(
            token_blacklist::table
                .filter(token_blacklist::jti.eq(jti))
                .filter(token_blacklist::expires_at.gt(now)),
        ))
        .get_result(conn)
        .map_err(Into::into)
    }

    pub fn delete_expired(
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        diesel::delete(token_blacklist::table.filter(token_blacklist::expires_at.le(now)))
            .execute(conn)
            .map_err(Into::into)
    }
}
