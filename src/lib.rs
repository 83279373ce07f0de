/// Public library interface for the habit sync client
///
/// This crate keeps a local cache of one user's habits and completions
/// aligned with a remote row store. Entities and streak derivation live in
/// [`domain`], the store abstraction in [`store`], session lifecycle and the
/// background refresh loop in [`sync`], and the leaderboard projection in
/// [`ranking`]. The [`HabitSyncClient`] ties them to an [`auth::AuthProvider`]
/// so that sessions always belong to a signed-in user.

use std::sync::Arc;

use thiserror::Error;

pub mod auth;
pub mod domain;
pub mod ranking;
pub mod store;
pub mod sync;

// Re-export the types most callers need
pub use auth::{AuthError, AuthProvider, MemoryAuth, User};
pub use domain::{
    Completion, DayWindow, DomainError, Frequency, Habit, HabitId, StreakStats, UserId,
};
pub use ranking::{rank, top, RankedHabit, PODIUM_SIZE};
pub use store::{MemoryStore, RemoteStore, StoreError};
pub use sync::{
    ActionError, CompletionOutcome, CompletionScope, Session, Snapshot, SyncOptions, WindowMode,
};

/// Errors that can occur while opening or closing sessions
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// Entry point binding an auth provider and a remote store together.
///
/// The client itself is cheap and stateless; all live state belongs to the
/// [`Session`]s it opens.
pub struct HabitSyncClient {
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    options: SyncOptions,
}

impl HabitSyncClient {
    /// Create a client with default sync options.
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_options(store, auth, SyncOptions::default())
    }

    /// Create a client with explicit sync options.
    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            auth,
            options,
        }
    }

    /// Register a new account and open a session for it.
    ///
    /// Credentials are checked client-side first; the provider is only
    /// contacted with well-formed input. A successful registration signs
    /// the user straight in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        auth::validate_credentials(email, password)?;
        self.auth.sign_up(email, password).await?;
        let user = self.auth.sign_in(email, password).await?;
        Ok(self.open_session(user).await?)
    }

    /// Sign in to an existing account and open a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        auth::validate_credentials(email, password)?;
        let user = self.auth.sign_in(email, password).await?;
        Ok(self.open_session(user).await?)
    }

    /// Reopen a session for a user the provider still considers signed in,
    /// if any. Called on startup so an app restart does not force a fresh
    /// sign-in.
    pub async fn resume(&self) -> Result<Option<Session>, ClientError> {
        match self.auth.current_user().await {
            Some(user) => Ok(Some(self.open_session(user).await?)),
            None => Ok(None),
        }
    }

    /// Close the session, then end the provider session.
    ///
    /// The order matters: the realtime channels are released while the user
    /// is still authorized to hold them.
    pub async fn sign_out(&self, session: Session) -> Result<(), ClientError> {
        session.close().await;
        self.auth.sign_out().await?;
        Ok(())
    }

    async fn open_session(&self, user: User) -> Result<Session, StoreError> {
        Session::start(Arc::clone(&self.store), user, self.options.clone()).await
    }
}
