// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Credential service: signup/login with hashed passwords.
//!
//! This gates nothing inside the room engine — rooms accept any supplied
//! display name. It exists so deployments can keep named accounts.

pub mod password;
pub mod routes;
mod service;
mod service_impl;

pub use password::{hash_password, verify_password};
pub use service::{CredentialService, LoginOutcome, SignupOutcome, UserProfile};
pub use service_impl::InMemoryCredentials;
