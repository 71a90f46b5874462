use async_trait::async_trait;

/// A registered account, as returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

/// Outcome of a signup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Created,
    NameTaken,
    EmailTaken,
}

/// Outcome of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success(UserProfile),
    UnknownEmail,
    WrongPassword,
}

#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Register an account. Emails are treated case-insensitively.
    async fn signup(&self, name: &str, email: &str, password: &str) -> anyhow::Result<SignupOutcome>;

    /// Verify credentials for an existing account
    async fn login(&self, email: &str, password: &str) -> LoginOutcome;
}
