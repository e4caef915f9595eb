pub mod auth;

pub use auth::{api_key_auth, Actor, X_USER_ID};
