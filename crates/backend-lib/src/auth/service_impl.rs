use crate::auth::password::{hash_password_secure, verify_password};
use crate::auth::service::{CredentialService, LoginOutcome, SignupOutcome, UserProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct UserRecord {
    name: String,
    password_hash: String,
}

/// In-memory account store keyed by lowercased email
#[derive(Clone, Default)]
pub struct InMemoryCredentials {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialService for InMemoryCredentials {
    async fn signup(&self, name: &str, email: &str, password: &str) -> anyhow::Result<SignupOutcome> {
        let email = email.to_lowercase();
        let mut users = self.users.write().await;

        if users.values().any(|u| u.name == name) {
            return Ok(SignupOutcome::NameTaken);
        }
        if users.contains_key(&email) {
            return Ok(SignupOutcome::EmailTaken);
        }

        let mut plain = password.to_string();
        let password_hash = hash_password_secure(&mut plain)?;
        users.insert(
            email,
            UserRecord {
                name: name.to_string(),
                password_hash,
            },
        );
        Ok(SignupOutcome::Created)
    }

    async fn login(&self, email: &str, password: &str) -> LoginOutcome {
        let email = email.to_lowercase();
        let users = self.users.read().await;

        let Some(record) = users.get(&email) else {
            return LoginOutcome::UnknownEmail;
        };
        if !verify_password(&record.password_hash, password) {
            return LoginOutcome::WrongPassword;
        }
        LoginOutcome::Success(UserProfile {
            name: record.name.clone(),
            email,
        })
    }
}
