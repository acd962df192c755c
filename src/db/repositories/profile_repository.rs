use diesel::prelude::*;
use uuid::Uuid;

use crate::db::error::RepositoryError;
use crate::db::models::profile::{Profile, ProfileChanges};
use crate::db::schema::profiles;

pub struct ProfileRepository;

impl ProfileRepository {
    pub fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        profiles::table
            .filter(profiles::id.eq(id))
            .select(Profile::as_select())
            .first(conn)
            .optional()
            .map_err(Into::into)
    }

    /// Fails with `NotFound` when the trigger has not created the row yet.
    pub fn update(
        conn: &mut PgConnection,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Profile, RepositoryError> {
        diesel::update(profiles::table.filter(profiles::id.eq(id)))
            .set(changes)
            .returning(Profile::as_returning())
            .get_result(conn)
            .map_err(Into::into)
    }
}
