/// Authentication provider abstraction
///
/// Sessions are always tied to a signed-in user, so the client needs a small
/// auth surface: sign up, sign in, sign out and the current user. Credential
/// shape is checked client-side before the provider is involved, mirroring
/// the form validation a user sees before any network call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{DomainError, UserId};

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Errors reported by an authentication provider
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No user is signed in")]
    NotSignedIn,
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// Check credential shape before contacting the provider.
///
/// Both fields must be present and the password long enough; the provider
/// never sees credentials that would fail these checks.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), DomainError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(DomainError::MissingCredentials);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Account operations the client needs from a backend.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new account. Does not sign the user in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Open a session for an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Close the current session. Signing out twice is not an error.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The user of the current session, if any.
    async fn current_user(&self) -> Option<User>;
}

/// Memory-backed auth provider for tests and demos.
#[derive(Default)]
pub struct MemoryAuth {
    inner: Mutex<AuthState>,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<User>,
}

struct Account {
    password: String,
    user: User,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }
}

fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let mut state = self.inner.lock().unwrap();
        let key = account_key(email);
        if state.accounts.contains_key(&key) {
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: UserId::new(Uuid::new_v4().to_string()),
            email: email.trim().to_string(),
        };
        state.accounts.insert(
            key,
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        tracing::info!("Registered account for {}", user.email);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let mut state = self.inner.lock().unwrap();
        let key = account_key(email);
        let user = match state.accounts.get(&key) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };

        state.current = Some(user.clone());
        tracing::info!("Signed in {}", user.email);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(user) = state.current.take() {
            tracing::info!("Signed out {}", user.email);
        }
        Ok(())
    }

    async fn current_user(&self) -> Option<User> {
        self.inner.lock().unwrap().current.clone()
    }
}
