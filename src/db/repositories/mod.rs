pub mod blacklist_repository;
pub mod profile_repository;
