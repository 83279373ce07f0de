/// Leaderboard projection over the cached snapshot
///
/// Ranks habits by their best-ever streak for the "top habits" display.
/// The projection is recomputed from a snapshot on demand and never stored,
/// so it can never drift from the data it was derived from.

use serde::Serialize;

use crate::domain::{streak_stats, Completion, Habit, StreakStats};

/// How many habits the podium shows.
pub const PODIUM_SIZE: usize = 3;

/// One habit paired with its derived streak numbers.
#[derive(Debug, Clone, Serialize)]
pub struct RankedHabit {
    pub habit: Habit,
    pub stats: StreakStats,
}

/// Rank habits by best streak, highest first.
///
/// The sort is stable, so habits with equal best streaks keep the order they
/// had in `habits`. Habits without any completions rank with all zeros rather
/// than disappearing.
pub fn rank(habits: &[Habit], completions: &[Completion]) -> Vec<RankedHabit> {
    let mut ranked: Vec<RankedHabit> = habits
        .iter()
        .map(|habit| RankedHabit {
            stats: streak_stats(&habit.id, completions),
            habit: habit.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.stats.best_streak.cmp(&a.stats.best_streak));
    ranked
}

/// The top `n` of a ranking, clamped to its length.
pub fn top(ranked: &[RankedHabit], n: usize) -> &[RankedHabit] {
    &ranked[..n.min(ranked.len())]
}
