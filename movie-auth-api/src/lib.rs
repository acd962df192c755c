//! # movie-auth-api
//!
//! Shared API types for the movie-auth service.
//! This crate is designed to be WASM-compatible and can be used in both
//! the backend (Rust) and a frontend build (WASM/TypeScript via wasm-bindgen).
//!
//! ## Features
//!
//! - Request DTOs (LoginRequest, RegisterRequest, UpdatePasswordRequest, etc.)
//! - Response DTOs (UserResponse, ProfileResponse, TokenPairResponse, etc.)
//! - Error response format (ErrorResponse)
//! - Generic response wrapper (AppResponse)
//!
//! ## Example
//!
//! ```rust
//! use movie_auth_api::LoginRequest;
//!
//! let request = LoginRequest {
//!     email: "user@example.com".to_string(),
//!     password: "Sup3r-secret".to_string(),
//!     redirect_to: Some("/watchlist".to_string()),
//! };
//! ```

pub mod error;
pub mod requests;
pub mod responses;
pub mod result;

// Re-exports for convenient access
pub use error::ErrorResponse;
pub use requests::*;
pub use responses::*;
pub use result::{AppResponse, StatusCode};
