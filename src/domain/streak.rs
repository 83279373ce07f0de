/// Streak derivation from completion history
///
/// Habit rows carry a denormalized `streak_count`, but anything shown to the
/// user is derived here from the raw completion records. The derivation is a
/// pure function of the history, so every caller with the same snapshot sees
/// the same numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Completion, HabitId};

/// Two completions at most this many days apart belong to the same run.
///
/// The slack beyond a full day tolerates completing a habit late one evening
/// and early two mornings later without dropping the streak.
pub const MAX_GAP_DAYS: f64 = 1.5;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Derived streak numbers for one habit.
///
/// `streak` is the length of the run containing the most recent completion;
/// it does not decay just because time has passed since then. `best_streak`
/// is the longest run anywhere in the history, so it is never smaller than
/// `streak`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakStats {
    /// Length of the run ending at the most recent completion.
    pub streak: u32,
    /// Longest run anywhere in the history.
    pub best_streak: u32,
    /// Total number of completions on record.
    pub total: u32,
}

/// Derive streak statistics for `habit_id` from a completion history.
///
/// The slice may contain completions for other habits and arrive in any
/// order; filtering and sorting happen here. An empty history yields all
/// zeros. Runs are walked over adjacent pairs: a gap of at most
/// [`MAX_GAP_DAYS`] extends the current run, a larger one starts a new run
/// of length 1. Several completions on the same day each extend the run,
/// matching how the completion count on the habit row grows.
pub fn streak_stats(habit_id: &HabitId, completions: &[Completion]) -> StreakStats {
    let mut times: Vec<DateTime<Utc>> = completions
        .iter()
        .filter(|c| c.is_for(habit_id))
        .map(|c| c.completed_at)
        .collect();
    times.sort_unstable();

    if times.is_empty() {
        return StreakStats::default();
    }

    let mut streak = 1u32;
    let mut best = 1u32;
    for pair in times.windows(2) {
        if gap_days(pair[0], pair[1]) <= MAX_GAP_DAYS {
            streak += 1;
        } else {
            streak = 1;
        }
        best = best.max(streak);
    }

    StreakStats {
        streak,
        best_streak: best,
        total: times.len() as u32,
    }
}

fn gap_days(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_DAY
}
