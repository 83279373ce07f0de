/// Completion entity
///
/// A completion is one "I did it" record for a habit. The history of these
/// rows is the source of truth for streak derivation; habits only cache a
/// denormalized count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CompletionId, HabitId, UserId};

/// One completion record for a habit, as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Store-assigned row id.
    pub id: CompletionId,
    /// Owner; always the same user as the habit it belongs to.
    pub user_id: UserId,
    /// The habit this completion belongs to.
    pub habit_id: HabitId,
    /// When the habit was completed.
    pub completed_at: DateTime<Utc>,
}

impl Completion {
    /// Whether this completion belongs to `habit_id`.
    pub fn is_for(&self, habit_id: &HabitId) -> bool {
        &self.habit_id == habit_id
    }
}
