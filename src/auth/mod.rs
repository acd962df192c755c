pub mod context;
pub mod error;
pub mod events;
pub mod extractors;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod services;
pub mod tokens;

#[cfg(test)]
pub mod testing;
