pub mod blacklisted_token;
pub mod profile;
