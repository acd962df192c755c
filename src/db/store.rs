use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use super::error::RepositoryError;
use super::models::blacklisted_token::{BlacklistedToken, NewBlacklistedToken};
use super::models::profile::{Profile, ProfileChanges};
use super::repositories::blacklist_repository::BlacklistRepository;
use super::repositories::profile_repository::ProfileRepository;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepositoryError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Profile, RepositoryError>;
}

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Idempotent: listing the same token id twice keeps a single entry.
    async fn add(&self, entry: NewBlacklistedToken) -> Result<bool, RepositoryError>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, RepositoryError>;

    /// Purges entries whose token has expired anyway; returns how many went.
    async fn cleanup_expired(&self) -> Result<usize, RepositoryError>;
}

// === Postgres ===

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, query: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            query(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        self.run(move |conn| ProfileRepository::find_by_id(conn, user_id))
            .await
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Profile, RepositoryError> {
        self.run(move |conn| ProfileRepository::update(conn, user_id, &changes))
            .await
    }
}

#[async_trait]
impl TokenBlacklist for PgStore {
    async fn add(&self, entry: NewBlacklistedToken) -> Result<bool, RepositoryError> {
        self.run(move |conn| BlacklistRepository::insert(conn, &entry))
            .await
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, RepositoryError> {
        let jti = jti.to_string();
        self.run(move |conn| BlacklistRepository::exists(conn, &jti, Utc::now()))
            .await
    }

    async fn cleanup_expired(&self) -> Result<usize, RepositoryError> {
        self.run(|conn| BlacklistRepository::delete_expired(conn, Utc::now()))
            .await
    }
}

// === In memory ===

#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<Uuid, Profile>>,
    blacklist: Mutex<HashMap<String, BlacklistedToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|e| RepositoryError::DatabaseError(format!("memory store poisoned: {e}")))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stands in for the sign-up trigger that creates profile rows.
    pub fn insert_profile(&self, profile: Profile) -> Result<(), RepositoryError> {
        lock(&self.profiles)?.insert(profile.id, profile);
        Ok(())
    }

    pub fn blacklist_len(&self) -> usize {
        lock(&self.blacklist).map(|b| b.len()).unwrap_or_default()
    }

    fn purge_before(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut blacklist = lock(&self.blacklist)?;
        let before = blacklist.len();
        blacklist.retain(|_, entry| entry.expires_at > now);
        Ok(before - blacklist.len())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        Ok(lock(&self.profiles)?.get(&user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Profile, RepositoryError> {
        let mut profiles = lock(&self.profiles)?;
        let profile = profiles
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound("Record not found".to_string()))?;
        changes.apply(profile);
        Ok(profile.clone())
    }
}

#[async_trait]
impl TokenBlacklist for MemoryStore {
    async fn add(&self, entry: NewBlacklistedToken) -> Result<bool, RepositoryError> {
        let mut blacklist = lock(&self.blacklist)?;
        if blacklist.contains_key(&entry.jti) {
            return Ok(false);
        }
        blacklist.insert(
            entry.jti.clone(),
            BlacklistedToken {
                id: Uuid::new_v4(),
                jti: entry.jti,
                user_id: entry.user_id,
                blacklisted_at: Utc::now(),
                expires_at: entry.expires_at,
                reason: entry.reason,
            },
        );
        Ok(true)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, RepositoryError> {
        let now = Utc::now();
        Ok(lock(&self.blacklist)?
            .get(jti)
            .is_some_and(|entry| entry.expires_at > now))
    }

    async fn cleanup_expired(&self) -> Result<usize, RepositoryError> {
        self.purge_before(Utc::now())
    }
}
