/// Background refresh loop behind a session
///
/// The controller is the only writer to a session's snapshot. It listens on
/// both realtime feeds, folds change hints and explicit refresh requests into
/// a debounce window, refetches whole collections when the window closes and
/// replaces the matching snapshot slice with whatever the store returned.
/// Fetches resolve through one channel, so when several are in flight the
/// last to resolve is simply the last applied.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::domain::{Completion, Habit, UserId};
use crate::store::normalize::{completion_from_row, habit_from_row, FIELD_COMPLETED_AT};
use crate::store::{
    Collection, RemoteStore, Row, RowError, RowFilter, StoreError, StoreEvent, Subscription,
};
use crate::sync::{CompletionScope, Snapshot, SyncOptions};

pub(crate) struct Controller {
    store: Arc<dyn RemoteStore>,
    owner: UserId,
    options: SyncOptions,
    state_tx: watch::Sender<Snapshot>,
}

/// Resolved refetch of one collection, good or bad.
struct FetchResult {
    collection: Collection,
    outcome: Result<Vec<Row>, StoreError>,
}

/// Decoded replacement for one snapshot slice.
enum SliceUpdate {
    Habits(Vec<Habit>),
    Completions(Vec<Completion>),
}

impl Controller {
    pub(crate) fn new(
        store: Arc<dyn RemoteStore>,
        owner: UserId,
        options: SyncOptions,
        state_tx: watch::Sender<Snapshot>,
    ) -> Self {
        Self {
            store,
            owner,
            options,
            state_tx,
        }
    }

    /// Drive the refresh loop until `shutdown_rx` fires.
    ///
    /// Both subscriptions are dropped on the way out, which releases their
    /// channels on every exit path.
    pub(crate) async fn run(
        self,
        habits_sub: Subscription,
        completions_sub: Subscription,
        mut refresh_rx: mpsc::Receiver<Collection>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let (fetch_tx, mut fetch_rx) = mpsc::channel::<FetchResult>(8);
        let mut habits_sub = Some(habits_sub);
        let mut completions_sub = Some(completions_sub);
        let mut refresh_open = true;
        let mut dirty: HashSet<Collection> = HashSet::new();
        let mut deadline: Option<Instant> = None;

        // Initial load goes out immediately; the debounce window only
        // applies to change-driven refreshes.
        for collection in Collection::ALL {
            self.spawn_fetch(collection, &fetch_tx);
        }

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::debug!("Sync loop for {} shutting down", self.owner);
                    break;
                }
                event = next_event(&mut habits_sub) => {
                    self.note_event(Collection::Habits, event, &mut habits_sub, &mut dirty, &mut deadline);
                }
                event = next_event(&mut completions_sub) => {
                    self.note_event(Collection::Completions, event, &mut completions_sub, &mut dirty, &mut deadline);
                }
                intent = refresh_rx.recv(), if refresh_open => {
                    match intent {
                        Some(collection) => self.mark_dirty(collection, &mut dirty, &mut deadline),
                        None => refresh_open = false,
                    }
                }
                result = fetch_rx.recv() => {
                    // fetch_tx lives in this scope, so recv cannot return
                    // None while the loop runs.
                    if let Some(result) = result {
                        self.apply(result);
                    }
                }
                _ = debounce_due(deadline) => {
                    deadline = None;
                    for collection in dirty.drain() {
                        self.spawn_fetch(collection, &fetch_tx);
                    }
                }
            }
        }
    }

    /// Record that a collection needs refetching and arm the debounce timer.
    ///
    /// The window is fixed-length: the first hint arms it and later hints do
    /// not push the deadline out, so a chatty feed cannot starve refreshes.
    fn mark_dirty(
        &self,
        collection: Collection,
        dirty: &mut HashSet<Collection>,
        deadline: &mut Option<Instant>,
    ) {
        dirty.insert(collection);
        if deadline.is_none() {
            *deadline = Some(Instant::now() + self.options.debounce);
        }
    }

    fn note_event(
        &self,
        collection: Collection,
        event: Option<StoreEvent>,
        slot: &mut Option<Subscription>,
        dirty: &mut HashSet<Collection>,
        deadline: &mut Option<Instant>,
    ) {
        match event {
            Some(event) if event.is_row_mutation() => {
                tracing::debug!("Change on {} feed, scheduling refresh", collection);
                self.mark_dirty(collection, dirty, deadline);
            }
            Some(_) => {
                // Non-mutation notification; nothing to refresh.
            }
            None => {
                tracing::warn!(
                    "Realtime feed for {} closed, live updates paused until next refresh request",
                    collection
                );
                *slot = None;
            }
        }
    }

    fn spawn_fetch(&self, collection: Collection, fetch_tx: &mpsc::Sender<FetchResult>) {
        let store = Arc::clone(&self.store);
        let filter = self.filter_for(collection);
        let tx = fetch_tx.clone();
        tokio::spawn(async move {
            let outcome = store.list_rows(collection, &filter).await;
            let _ = tx.send(FetchResult { collection, outcome }).await;
        });
    }

    fn filter_for(&self, collection: Collection) -> RowFilter {
        let filter = RowFilter::owned_by(self.owner.clone());
        match (collection, self.options.completion_scope) {
            (Collection::Completions, CompletionScope::Today) => {
                filter.within(FIELD_COMPLETED_AT, self.options.window_mode.today())
            }
            _ => filter,
        }
    }

    /// Fold one resolved fetch into the snapshot.
    ///
    /// A failed fetch or a collection with any undecodable row leaves the
    /// previous snapshot standing; the cache may go stale but never partial.
    fn apply(&self, result: FetchResult) {
        let rows = match result.outcome {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!("Refresh of {} failed: {}", result.collection, err);
                return;
            }
        };

        match decode(result.collection, rows) {
            Ok(update) => {
                self.state_tx.send_modify(|snapshot| match update {
                    SliceUpdate::Habits(habits) => {
                        tracing::debug!("Replacing habits cache ({} rows)", habits.len());
                        snapshot.habits = habits;
                    }
                    SliceUpdate::Completions(completions) => {
                        tracing::debug!("Replacing completions cache ({} rows)", completions.len());
                        snapshot.completions = completions;
                    }
                });
            }
            Err(err) => {
                tracing::warn!("Discarding {} refresh: {}", result.collection, err);
            }
        }
    }
}

fn decode(collection: Collection, rows: Vec<Row>) -> Result<SliceUpdate, RowError> {
    match collection {
        Collection::Habits => {
            let habits = rows.iter().map(habit_from_row).collect::<Result<_, _>>()?;
            Ok(SliceUpdate::Habits(habits))
        }
        Collection::Completions => {
            let completions = rows
                .iter()
                .map(completion_from_row)
                .collect::<Result<_, _>>()?;
            Ok(SliceUpdate::Completions(completions))
        }
    }
}

/// Next event from a feed, or park forever once it has closed.
///
/// Parking keeps the select loop free of busy polling after a feed loss
/// while the other arms continue to serve.
async fn next_event(sub: &mut Option<Subscription>) -> Option<StoreEvent> {
    match sub {
        Some(active) => active.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the debounce deadline, or park when none is armed.
async fn debounce_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
