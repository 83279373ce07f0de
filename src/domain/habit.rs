/// Habit entity and related functionality
///
/// This module defines the Habit struct that mirrors one habit row in the
/// remote store, plus the validated NewHabit draft used when creating one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Frequency, HabitId, UserId};

/// Longest accepted habit title, in characters.
pub const MAX_TITLE_LEN: usize = 100;
/// Longest accepted habit description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A habit the user wants to perform regularly.
///
/// Instances always come from the remote store; the cached copy carries the
/// store's own bookkeeping (`streak_count`, `last_completed`) untouched.
/// Streak display never reads `streak_count` directly, it is re-derived from
/// the completion history so that stale rows cannot inflate a streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    /// Store-assigned row id.
    pub id: HabitId,
    /// Owner of the habit; rows are only ever fetched for one owner.
    pub user_id: UserId,
    /// Display title (e.g. "Morning Run").
    pub title: String,
    /// Free-form description, possibly empty.
    pub description: String,
    /// How often the habit is meant to be performed.
    pub frequency: Frequency,
    /// Denormalized completion count maintained on the row.
    pub streak_count: u32,
    /// Timestamp of the most recent completion written back to the row.
    pub last_completed: Option<DateTime<Utc>>,
    /// When the habit row was created.
    pub created_at: DateTime<Utc>,
}

/// A validated draft of a habit, ready to be sent to the store.
///
/// The store assigns the row id, so the draft carries everything but.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHabit {
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub frequency: Frequency,
    pub created_at: DateTime<Utc>,
}

impl NewHabit {
    /// Build a draft, rejecting titles and descriptions that break the
    /// field limits. The title is trimmed; a draft never starts with a
    /// completion on record, so `last_completed` stays unset until the
    /// first completion writes it.
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        description: impl Into<String>,
        frequency: Frequency,
    ) -> Result<Self, DomainError> {
        let title = title.into().trim().to_string();
        let description = description.into();
        validate_title(&title)?;
        validate_description(&description)?;

        Ok(Self {
            user_id,
            title,
            description,
            frequency,
            created_at: Utc::now(),
        })
    }
}

fn validate_title(title: &str) -> Result<(), DomainError> {
    if title.is_empty() {
        return Err(DomainError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(DomainError::TitleTooLong(MAX_TITLE_LEN));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), DomainError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(DomainError::DescriptionTooLong(MAX_DESCRIPTION_LEN));
    }
    Ok(())
}
