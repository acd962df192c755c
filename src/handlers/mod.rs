pub mod auth;
pub mod health;
pub mod pages;
pub mod tokens;

use movie_auth_api::{ProfileResponse, UserResponse};

use crate::db::models::profile::Profile;
use crate::provider::User;

pub(crate) fn user_response(user: &User) -> UserResponse {
    UserResponse {
        id: user.id,
        email: user.email.clone(),
        full_name: user.user_metadata.full_name.clone(),
        avatar_url: user.user_metadata.avatar_url.clone(),
    }
}

pub(crate) fn profile_response(profile: Profile) -> ProfileResponse {
    ProfileResponse {
        id: profile.id,
        email: profile.email,
        full_name: profile.full_name,
        avatar_url: profile.avatar_url,
        created_at: profile.created_at,
        updated_at: profile.updated_at,
    }
}
