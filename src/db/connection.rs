use diesel::PgConnection;
use diesel::r2d2::ConnectionManager;

use super::DbPool;
use super::error::RepositoryError;

pub const DEFAULT_POOL_SIZE: u32 = 5;

/// With `min_idle` at zero no connection is opened until first use, so the
/// service starts even while the database is still coming up.
pub fn create_pool(database_url: &str, max_size: u32) -> Result<DbPool, RepositoryError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);

    diesel::r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .build(manager)
        .map_err(Into::into)
}
