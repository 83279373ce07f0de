/// Domain module containing core entities and pure derivation logic
///
/// This module defines the entities cached from the remote store (Habit,
/// Completion), their validation rules, and the streak engine that derives
/// display numbers from completion history.

pub mod completion;
pub mod habit;
pub mod streak;
pub mod types;

// Re-export public types for easy access
pub use completion::*;
pub use habit::*;
pub use streak::*;
pub use types::*;

use thiserror::Error;

/// Errors that can occur during domain validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Habit title cannot be empty")]
    EmptyTitle,

    #[error("Habit title cannot be longer than {0} characters")]
    TitleTooLong(usize),

    #[error("Description cannot be longer than {0} characters")]
    DescriptionTooLong(usize),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Please fill in all fields")]
    MissingCredentials,

    #[error("Passwords must be at least {0} characters long")]
    PasswordTooShort(usize),
}
