use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Queryable, Selectable};
use serde::Serialize;
use uuid::Uuid;

use crate::db::schema::profiles;

/// Application-owned display attributes, one row per provider user.
/// Rows are created by a database trigger when the user signs up.
#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `None` leaves the column untouched.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileChanges {
    pub fn new(full_name: Option<String>, avatar_url: Option<String>) -> Self {
        Self {
            full_name,
            avatar_url,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&self, profile: &mut Profile) {
        if let Some(name) = &self.full_name {
            profile.full_name = Some(name.clone());
        }
        if let Some(avatar) = &self.avatar_url {
            profile.avatar_url = Some(avatar.clone());
        }
        profile.updated_at = self.updated_at;
    }
}
