/// Behavioral tests for the streak engine and the ranking projection
use chrono::{DateTime, Duration, TimeZone, Utc};
use habit_sync::domain::streak_stats;
use habit_sync::*;

#[cfg(test)]
mod engine_behavior {
    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap()
    }

    fn completion(habit: &str, n: u32, at: DateTime<Utc>) -> Completion {
        Completion {
            id: domain::CompletionId::new(format!("{habit}-{n}")),
            user_id: UserId::new("u1"),
            habit_id: HabitId::new(habit),
            completed_at: at,
        }
    }

    /// Completions spaced by `step`, starting at `base()`.
    fn rhythm(habit: &str, count: u32, step: Duration) -> Vec<Completion> {
        (0..count)
            .map(|i| completion(habit, i, base() + step * i as i32))
            .collect()
    }

    #[test]
    fn test_stats_are_a_pure_function_of_history() {
        let history = rhythm("h1", 6, Duration::days(1));

        let first = streak_stats(&HabitId::new("h1"), &history);
        let second = streak_stats(&HabitId::new("h1"), &history);
        assert_eq!(first, second);

        let mut reversed = history.clone();
        reversed.reverse();
        assert_eq!(streak_stats(&HabitId::new("h1"), &reversed), first);

        // Rotate so the runs are interleaved arbitrarily.
        let mut rotated = history;
        rotated.rotate_left(2);
        assert_eq!(streak_stats(&HabitId::new("h1"), &rotated), first);
    }

    #[test]
    fn test_interleaved_habits_do_not_disturb_each_other() {
        let mut history = Vec::new();
        for i in 0..4 {
            history.push(completion("run", i, base() + Duration::days(i as i64)));
            history.push(completion(
                "read",
                i,
                base() + Duration::days(i as i64 * 3),
            ));
        }

        let run = streak_stats(&HabitId::new("run"), &history);
        assert_eq!(run.streak, 4);
        assert_eq!(run.total, 4);

        // Three-day spacing breaks every pair.
        let read = streak_stats(&HabitId::new("read"), &history);
        assert_eq!(read.streak, 1);
        assert_eq!(read.best_streak, 1);
        assert_eq!(read.total, 4);
    }

    #[test]
    fn test_slow_rhythm_within_the_gap_still_counts() {
        // Just under a day and a half between completions.
        let history = rhythm("h1", 5, Duration::hours(35));
        let stats = streak_stats(&HabitId::new("h1"), &history);
        assert_eq!(stats.streak, 5);
        assert_eq!(stats.best_streak, 5);
    }

    #[test]
    fn test_every_other_day_never_forms_a_run() {
        let history = rhythm("h1", 5, Duration::days(2));
        let stats = streak_stats(&HabitId::new("h1"), &history);
        assert_eq!(stats.streak, 1);
        assert_eq!(stats.best_streak, 1);
        assert_eq!(stats.total, 5);
    }

    #[test]
    fn test_long_history_with_one_lapse() {
        let mut history = rhythm("h1", 30, Duration::days(1));
        let resume = base() + Duration::days(33);
        for i in 0..5 {
            history.push(completion("h1", 100 + i, resume + Duration::days(i as i64)));
        }

        let stats = streak_stats(&HabitId::new("h1"), &history);
        assert_eq!(stats.best_streak, 30);
        assert_eq!(stats.streak, 5);
        assert_eq!(stats.total, 35);
    }

    #[test]
    fn test_streak_does_not_decay_after_the_last_completion() {
        // History ends long before "now"; the run containing the final
        // completion still reports its full length.
        let history = rhythm("h1", 3, Duration::days(1));
        let stats = streak_stats(&HabitId::new("h1"), &history);
        assert_eq!(stats.streak, 3);
    }
}

#[cfg(test)]
mod ranking_behavior {
    use super::*;

    fn habit(id: &str, title: &str) -> Habit {
        Habit {
            id: HabitId::new(id),
            user_id: UserId::new("u1"),
            title: title.to_string(),
            description: String::new(),
            frequency: Frequency::Daily,
            streak_count: 0,
            last_completed: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn daily_run(habit_id: &str, start: DateTime<Utc>, days: u32) -> Vec<Completion> {
        (0..days)
            .map(|i| Completion {
                id: domain::CompletionId::new(format!("{habit_id}-{i}")),
                user_id: UserId::new("u1"),
                habit_id: HabitId::new(habit_id),
                completed_at: start + Duration::days(i as i64),
            })
            .collect()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 20, 0, 0).unwrap()
    }

    #[test]
    fn test_historical_best_beats_a_longer_current_run() {
        let habits = vec![habit("a", "Stretch"), habit("b", "Journal")];

        // "a": ten days long ago, then a single recent completion.
        let mut completions = daily_run("a", start(), 10);
        completions.extend(daily_run("a", start() + Duration::days(40), 1));
        // "b": four days, all current.
        completions.extend(daily_run("b", start() + Duration::days(40), 4));

        let ranked = rank(&habits, &completions);
        assert_eq!(ranked[0].habit.id.as_str(), "a");
        assert_eq!(ranked[0].stats.best_streak, 10);
        assert_eq!(ranked[0].stats.streak, 1);
        assert_eq!(ranked[1].stats.best_streak, 4);
    }

    #[test]
    fn test_podium_takes_the_top_three_of_many() {
        let habits: Vec<Habit> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| habit(id, id))
            .collect();
        let mut completions = Vec::new();
        for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            completions.extend(daily_run(id, start(), (i + 1) as u32));
        }

        let ranked = rank(&habits, &completions);
        let podium = top(&ranked, PODIUM_SIZE);
        let names: Vec<&str> = podium.iter().map(|r| r.habit.id.as_str()).collect();
        assert_eq!(names, ["e", "d", "c"]);
    }

    #[test]
    fn test_ties_and_zeros_keep_snapshot_order() {
        let habits = vec![habit("a", "A"), habit("b", "B"), habit("c", "C")];
        // Only "b" has history; "a" and "c" tie at zero.
        let completions = daily_run("b", start(), 2);

        let ranked = rank(&habits, &completions);
        let names: Vec<&str> = ranked.iter().map(|r| r.habit.id.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert_eq!(ranked[1].stats, StreakStats::default());
    }

    #[test]
    fn test_ranking_reflects_engine_totals() {
        let habits = vec![habit("a", "A")];
        let completions = daily_run("a", start(), 7);

        let ranked = rank(&habits, &completions);
        assert_eq!(ranked[0].stats.total, 7);
        assert!(ranked[0].stats.best_streak >= ranked[0].stats.streak);
    }
}
