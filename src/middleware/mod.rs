pub mod cookies;
pub mod session;
