/// A signed-in user's handle on their synced data
///
/// The session owns the background controller, exposes snapshots and the
/// user-initiated actions, and enforces the once-per-day completion guard.
/// Closing the session tears the controller down and releases both realtime
/// channels before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::auth::User;
use crate::domain::{DayWindow, Frequency, Habit, HabitId, NewHabit};
use crate::ranking::{rank, RankedHabit, PODIUM_SIZE};
use crate::store::normalize::{completion_fields, habit_fields, habit_progress_fields};
use crate::store::{Channel, Collection, RemoteStore, StoreError};
use crate::sync::controller::Controller;
use crate::sync::{ActionError, Snapshot, SyncOptions};

/// What a completion attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A new completion row was written.
    Recorded,
    /// The habit already had a completion inside today's window; nothing
    /// was written.
    AlreadyCompleted,
}

impl CompletionOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, CompletionOutcome::Recorded)
    }
}

/// Live view of one user's habits and completions.
pub struct Session {
    user: User,
    store: Arc<dyn RemoteStore>,
    options: SyncOptions,
    state_rx: watch::Receiver<Snapshot>,
    refresh_tx: mpsc::Sender<Collection>,
    /// Completions this session has written but not yet seen come back
    /// through a refresh, keyed by habit. Backstop for the guard while the
    /// snapshot is stale.
    recorded: Mutex<HashMap<HabitId, DateTime<Utc>>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Open a session: subscribe to both feeds, then start the controller,
    /// which fetches the initial data. Subscribing first means a change
    /// racing the initial fetch still produces a hint and a refetch.
    pub async fn start(
        store: Arc<dyn RemoteStore>,
        user: User,
        options: SyncOptions,
    ) -> Result<Self, StoreError> {
        let habits_sub = store
            .subscribe(Channel::new(Collection::Habits, user.id.clone()))
            .await?;
        let completions_sub = store
            .subscribe(Channel::new(Collection::Completions, user.id.clone()))
            .await?;

        let (state_tx, state_rx) = watch::channel(Snapshot::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let controller = Controller::new(
            Arc::clone(&store),
            user.id.clone(),
            options.clone(),
            state_tx,
        );
        let task = tokio::spawn(controller.run(habits_sub, completions_sub, refresh_rx, shutdown_rx));
        tracing::info!("Session started for {}", user.email);

        Ok(Self {
            user,
            store,
            options,
            state_rx,
            refresh_tx,
            recorded: Mutex::new(HashMap::new()),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// The signed-in user this session belongs to.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.state_rx.borrow().clone()
    }

    /// A receiver that yields every snapshot replacement.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.state_rx.clone()
    }

    /// Today's guard window under this session's options.
    pub fn today(&self) -> DayWindow {
        self.options.window_mode.today()
    }

    /// Habits already completed inside today's window.
    pub fn completed_today(&self) -> std::collections::HashSet<HabitId> {
        self.state_rx.borrow().completed_habit_ids(self.today())
    }

    /// All habits ranked by best streak, highest first.
    pub fn leaderboard(&self) -> Vec<RankedHabit> {
        let snapshot = self.state_rx.borrow();
        rank(&snapshot.habits, &snapshot.completions)
    }

    /// The top of the leaderboard, at most [`PODIUM_SIZE`] entries.
    pub fn podium(&self) -> Vec<RankedHabit> {
        let mut ranked = self.leaderboard();
        ranked.truncate(PODIUM_SIZE);
        ranked
    }

    /// Create a habit owned by this session's user.
    ///
    /// Validation happens before anything is sent; an invalid draft never
    /// reaches the store.
    pub async fn create_habit(
        &self,
        title: &str,
        description: &str,
        frequency: Frequency,
    ) -> Result<HabitId, ActionError> {
        let draft = NewHabit::new(self.user.id.clone(), title, description, frequency)?;
        let row = self
            .store
            .create_row(Collection::Habits, habit_fields(&draft))
            .await?;
        tracing::info!("Created habit {} ({})", draft.title, row.id);

        self.request_refresh(Collection::Habits).await;
        Ok(HabitId::new(row.id))
    }

    /// Record a completion for today, at most once per habit per window.
    ///
    /// The guard consults the snapshot first and then this session's own
    /// in-flight record, so a double tap cannot write twice even while the
    /// first write has not come back through a refresh yet. On success the
    /// habit row's denormalized progress fields are bumped as well; if that
    /// second write fails the completion still stands, and the streak
    /// numbers derived from history stay correct.
    pub async fn complete_habit(
        &self,
        habit_id: &HabitId,
    ) -> Result<CompletionOutcome, ActionError> {
        let window = self.today();
        let now = Utc::now();
        let snapshot = self.snapshot();

        if snapshot.is_completed_in(habit_id, window) {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }
        {
            let mut recorded = self.recorded.lock().unwrap();
            if let Some(&at) = recorded.get(habit_id) {
                if window.contains(at) {
                    return Ok(CompletionOutcome::AlreadyCompleted);
                }
            }
            // Reserve the window before the write goes out.
            recorded.insert(habit_id.clone(), now);
        }

        let fields = completion_fields(&self.user.id, habit_id, now);
        if let Err(err) = self.store.create_row(Collection::Completions, fields).await {
            // The reservation only stands once the row does.
            self.recorded.lock().unwrap().remove(habit_id);
            return Err(err.into());
        }
        self.request_refresh(Collection::Completions).await;

        match snapshot.habit(habit_id) {
            Some(habit) => {
                let patch = habit_progress_fields(habit.streak_count.saturating_add(1), now);
                self.store
                    .update_row(Collection::Habits, habit_id.as_str(), patch)
                    .await?;
                self.request_refresh(Collection::Habits).await;
            }
            None => {
                tracing::warn!(
                    "Habit {} not in cache; completion recorded without a row update",
                    habit_id
                );
            }
        }

        tracing::info!("Completed habit {}", habit_id);
        Ok(CompletionOutcome::Recorded)
    }

    /// Delete a habit row.
    ///
    /// Completion history is left in place; the habit simply stops
    /// appearing once the refresh lands.
    pub async fn delete_habit(&self, habit_id: &HabitId) -> Result<(), ActionError> {
        self.store
            .delete_row(Collection::Habits, habit_id.as_str())
            .await?;
        tracing::info!("Deleted habit {}", habit_id);

        self.request_refresh(Collection::Habits).await;
        Ok(())
    }

    /// Habits currently in the cache, unranked.
    pub fn habits(&self) -> Vec<Habit> {
        self.state_rx.borrow().habits.clone()
    }

    /// Shut the controller down and wait until both realtime channels are
    /// released. After this returns no further snapshot is published.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!("Session closed for {}", self.user.email);
    }

    async fn request_refresh(&self, collection: Collection) {
        // Only fails when the controller is already gone.
        let _ = self.refresh_tx.send(collection).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // close() already took the task; a session dropped without close
        // must not leave the controller running.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
