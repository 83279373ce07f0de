/// Synchronization layer keeping a local cache aligned with the store
///
/// A signed-in user gets a [`Session`]: a background controller holds two
/// realtime subscriptions (habits and completions), debounces change hints
/// into full refetches, and publishes immutable snapshots over a watch
/// channel. User actions write to the store first and let the refresh cycle
/// fold the result back into the cache, so there is a single code path by
/// which data ever changes.

pub mod controller;
pub mod session;

pub use session::{CompletionOutcome, Session};

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::{Completion, DayWindow, DomainError, Habit, HabitId};
use crate::store::StoreError;

/// Errors from user-initiated actions on a session
#[derive(thiserror::Error, Debug)]
pub enum ActionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// How much completion history a session keeps in its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionScope {
    /// The full history. Required for streak derivation and ranking.
    All,
    /// Only the current day window. Enough for the completed-today set on
    /// a lightweight view, at the cost of all-zero streak stats.
    Today,
}

/// Which calendar defines "today" for the completion guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Midnight to midnight in the device-local timezone.
    LocalDay,
    /// Midnight to midnight in UTC. Useful when several devices in
    /// different timezones should agree on the day boundary.
    UtcDay,
}

impl WindowMode {
    pub fn today(&self) -> DayWindow {
        match self {
            WindowMode::LocalDay => DayWindow::today_local(),
            WindowMode::UtcDay => DayWindow::today_utc(),
        }
    }
}

/// Tuning knobs for a session's sync behavior.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How long a change hint waits for company before the refetch fires.
    /// The window is fixed: the first hint arms it, later hints ride along.
    pub debounce: Duration,
    /// How much completion history to fetch.
    pub completion_scope: CompletionScope,
    /// The day boundary used by the completion guard.
    pub window_mode: WindowMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            completion_scope: CompletionScope::All,
            window_mode: WindowMode::LocalDay,
        }
    }
}

/// One immutable view of the user's data.
///
/// Snapshots are only ever replaced wholesale by the controller; readers
/// clone what they need and never patch. Consumers therefore cannot observe
/// a half-applied refresh.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub habits: Vec<Habit>,
    pub completions: Vec<Completion>,
}

impl Snapshot {
    /// Look up a habit by id.
    pub fn habit(&self, id: &HabitId) -> Option<&Habit> {
        self.habits.iter().find(|h| &h.id == id)
    }

    /// Ids of habits with at least one completion inside `window`.
    pub fn completed_habit_ids(&self, window: DayWindow) -> HashSet<HabitId> {
        self.completions
            .iter()
            .filter(|c| window.contains(c.completed_at))
            .map(|c| c.habit_id.clone())
            .collect()
    }

    /// Whether `habit_id` has a completion inside `window`.
    pub fn is_completed_in(&self, habit_id: &HabitId, window: DayWindow) -> bool {
        self.completions
            .iter()
            .any(|c| c.is_for(habit_id) && window.contains(c.completed_at))
    }
}
