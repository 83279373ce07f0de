/// End-to-end tests over the in-memory backend
///
/// These drive the public client surface the way an app would: sign in,
/// mutate through sessions, and assert on what the snapshots converge to
/// and on what actually reached the store.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use habit_sync::store::normalize::{completion_fields, habit_from_row};
use habit_sync::store::{Channel, Collection, Row, RowFilter, Subscription};
use habit_sync::*;
use serde_json::{Map, Value};

#[cfg(test)]
mod sync_flow_tests {
    use super::*;

    fn fast() -> SyncOptions {
        SyncOptions {
            debounce: Duration::from_millis(15),
            ..SyncOptions::default()
        }
    }

    fn new_client() -> (Arc<MemoryStore>, Arc<MemoryAuth>, HabitSyncClient) {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(MemoryAuth::new());
        let client = HabitSyncClient::with_options(store.clone(), auth.clone(), fast());
        (store, auth, client)
    }

    async fn completion_rows(store: &MemoryStore, owner: &str) -> Vec<Row> {
        store
            .list_rows(
                Collection::Completions,
                &RowFilter::owned_by(UserId::new(owner)),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_creates_a_live_session() {
        let (_store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();

        let id = session
            .create_habit("Morning Run", "Around the block", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        let snapshot = session.snapshot();
        let habit = snapshot.habit(&id).unwrap();
        assert_eq!(habit.title, "Morning Run");
        assert_eq!(habit.frequency, Frequency::Daily);
        assert_eq!(habit.streak_count, 0);
        assert_eq!(habit.last_completed, None);
        assert_eq!(habit.user_id, session.user().id);

        client.sign_out(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_completion_updates_history_and_habit_row() {
        let (store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let owner = session.user().id.as_str().to_string();

        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        let outcome = session.complete_habit(&id).await.unwrap();
        assert!(outcome.is_recorded());
        wait_for(&session, |s| {
            s.completions.len() == 1 && s.habit(&id).map(|h| h.streak_count) == Some(1)
        })
        .await;

        // The store row carries the bumped progress fields.
        let rows = store
            .list_rows(Collection::Habits, &RowFilter::owned_by(session.user().id.clone()))
            .await
            .unwrap();
        let stored = habit_from_row(&rows[0]).unwrap();
        assert_eq!(stored.streak_count, 1);
        assert!(stored.last_completed.is_some());

        assert_eq!(completion_rows(&store, &owner).await.len(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_double_completion_is_idempotent_across_refreshes() {
        let (store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let owner = session.user().id.as_str().to_string();

        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        // First attempt writes; the immediate retry races the refresh and
        // must be caught by the in-flight record.
        assert!(session.complete_habit(&id).await.unwrap().is_recorded());
        assert_eq!(
            session.complete_habit(&id).await.unwrap(),
            CompletionOutcome::AlreadyCompleted
        );

        wait_for(&session, |s| !s.completions.is_empty()).await;
        // Once the snapshot knows, the guard answers from it.
        assert_eq!(
            session.complete_habit(&id).await.unwrap(),
            CompletionOutcome::AlreadyCompleted
        );

        assert_eq!(completion_rows(&store, &owner).await.len(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_two_devices_converge() {
        let (_store, _auth, client) = new_client();
        let device_a = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let device_b = client.sign_in("a@b.test", "secret-1").await.unwrap();

        let id = device_a
            .create_habit("Meditate", "", Frequency::Daily)
            .await
            .unwrap();
        device_a.complete_habit(&id).await.unwrap();

        // The second device never acted; its feed alone must bring it level.
        wait_for(&device_b, |s| {
            s.habit(&id).is_some() && s.completions.len() == 1
        })
        .await;
        assert!(device_b.completed_today().contains(&id));

        let ranked = device_b.leaderboard();
        assert_eq!(ranked[0].habit.id, id);
        assert_eq!(ranked[0].stats.total, 1);

        device_b.close().await;
        client.sign_out(device_a).await.unwrap();
    }

    #[tokio::test]
    async fn test_today_scope_fetches_only_the_current_window() {
        let (store, auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let user_id = session.user().id.clone();

        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;
        session.complete_habit(&id).await.unwrap();

        // A completion from yesterday, written as another device would.
        store
            .create_row(
                Collection::Completions,
                completion_fields(&user_id, &id, Utc::now() - chrono::Duration::days(1)),
            )
            .await
            .unwrap();
        wait_for(&session, |s| s.completions.len() == 2).await;

        let today_client = HabitSyncClient::with_options(
            store.clone(),
            auth,
            SyncOptions {
                completion_scope: CompletionScope::Today,
                ..fast()
            },
        );
        let today_session = today_client.sign_in("a@b.test", "secret-1").await.unwrap();
        wait_for(&today_session, |s| {
            s.habit(&id).is_some() && s.completions.len() == 1
        })
        .await;

        assert!(today_session.completed_today().contains(&id));
        assert_eq!(today_session.snapshot().completions.len(), 1);

        today_session.close().await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_deleting_a_habit_retains_history_but_leaves_ranking() {
        let (store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let owner = session.user().id.as_str().to_string();

        let keep = session
            .create_habit("Keep", "", Frequency::Daily)
            .await
            .unwrap();
        let drop_id = session
            .create_habit("Drop", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habits.len() == 2).await;
        session.complete_habit(&drop_id).await.unwrap();
        wait_for(&session, |s| s.completions.len() == 1).await;

        session.delete_habit(&drop_id).await.unwrap();
        wait_for(&session, |s| s.habits.len() == 1).await;

        // History rows are not cascaded away.
        assert_eq!(completion_rows(&store, &owner).await.len(), 1);

        let ranked = session.leaderboard();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].habit.id, keep);

        session.close().await;
    }

    #[tokio::test]
    async fn test_malformed_rows_leave_the_previous_snapshot_standing() {
        let (store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let user_id = session.user().id.clone();

        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        // A completion row with no timestamp cannot be decoded; the
        // completions refresh it triggers must be discarded wholesale.
        let mut bad = completion_fields(&user_id, &id, Utc::now());
        bad.remove("completed_at");
        store
            .create_row(Collection::Completions, bad)
            .await
            .unwrap();

        // Fence: a habits-side change still flows through, proving the
        // loop is alive while the bad collection is held back.
        let rows = store
            .list_rows(Collection::Habits, &RowFilter::owned_by(user_id.clone()))
            .await
            .unwrap();
        let mut patch = Map::new();
        patch.insert("streak_count".into(), Value::from(7u32));
        store
            .update_row(Collection::Habits, &rows[0].id, patch)
            .await
            .unwrap();

        wait_for(&session, |s| {
            s.habit(&id).map(|h| h.streak_count) == Some(7)
        })
        .await;
        assert!(session.snapshot().completions.is_empty());

        session.close().await;
    }

    #[tokio::test]
    async fn test_sign_out_releases_channels_deterministically() {
        let (store, auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        assert_eq!(store.subscriber_count(), 2);

        let user_id = session.user().id.clone();
        let mut rx = session.watch();
        client.sign_out(session).await.unwrap();

        assert_eq!(store.subscriber_count(), 0);
        assert!(auth.current_user().await.is_none());

        // Store traffic after sign-out reaches nobody; the snapshot channel
        // is already closed.
        store
            .create_row(
                Collection::Completions,
                completion_fields(&user_id, &HabitId::new("h1"), Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(store.subscriber_count(), 0);
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_resume_reopens_a_session_for_the_signed_in_user() {
        let (store, _auth, client) = new_client();
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        // The session object goes away without a sign-out, as on app exit.
        session.close().await;
        assert_eq!(store.subscriber_count(), 0);

        let resumed = client
            .resume()
            .await
            .unwrap()
            .expect("provider still holds a session");
        wait_for(&resumed, |s| s.habit(&id).is_some()).await;
        assert_eq!(resumed.user().email, "a@b.test");
        assert_eq!(store.subscriber_count(), 2);

        client.sign_out(resumed).await.unwrap();
        assert!(client.resume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_credentials_open_no_channels() {
        let (store, _auth, client) = new_client();

        let rejected = client.sign_up("a@b.test", "abc").await;
        assert!(matches!(rejected, Err(ClientError::Validation(_))));

        let rejected = client.sign_in("a@b.test", "secret-1").await;
        assert!(matches!(rejected, Err(ClientError::Auth(_))));

        assert_eq!(store.subscriber_count(), 0);
    }
}

#[cfg(test)]
mod failure_injection {
    use super::*;

    /// Store wrapper that can be told to fail row updates.
    struct FlakyStore {
        inner: MemoryStore,
        fail_updates: AtomicBool,
        update_calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_updates: AtomicBool::new(false),
                update_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FlakyStore {
        async fn list_rows(
            &self,
            collection: Collection,
            filter: &RowFilter,
        ) -> Result<Vec<Row>, StoreError> {
            self.inner.list_rows(collection, filter).await
        }

        async fn create_row(
            &self,
            collection: Collection,
            data: Map<String, Value>,
        ) -> Result<Row, StoreError> {
            self.inner.create_row(collection, data).await
        }

        async fn update_row(
            &self,
            collection: Collection,
            id: &str,
            patch: Map<String, Value>,
        ) -> Result<Row, StoreError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Network("injected update failure".to_string()));
            }
            self.inner.update_row(collection, id, patch).await
        }

        async fn delete_row(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
            self.inner.delete_row(collection, id).await
        }

        async fn subscribe(&self, channel: Channel) -> Result<Subscription, StoreError> {
            self.inner.subscribe(channel).await
        }
    }

    #[tokio::test]
    async fn test_failed_habit_row_update_keeps_derived_streaks_correct() {
        let store = Arc::new(FlakyStore::new());
        let auth = Arc::new(MemoryAuth::new());
        let client = HabitSyncClient::with_options(
            store.clone(),
            auth,
            SyncOptions {
                debounce: Duration::from_millis(15),
                ..SyncOptions::default()
            },
        );
        let session = client.sign_up("a@b.test", "secret-1").await.unwrap();
        let owner = session.user().id.clone();

        let id = session
            .create_habit("Read", "", Frequency::Daily)
            .await
            .unwrap();
        wait_for(&session, |s| s.habit(&id).is_some()).await;

        store.fail_updates.store(true, Ordering::SeqCst);
        let err = session.complete_habit(&id).await.unwrap_err();
        assert!(matches!(err, ActionError::Store(_)));
        assert_eq!(store.update_calls.load(Ordering::SeqCst), 1);

        // The completion row itself stands.
        let rows = store
            .inner
            .list_rows(
                Collection::Completions,
                &RowFilter::owned_by(owner.clone()),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        // The cached habit row still shows zero, but the numbers derived
        // from history are right.
        wait_for(&session, |s| s.completions.len() == 1).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.habit(&id).unwrap().streak_count, 0);
        let ranked = session.leaderboard();
        assert_eq!(ranked[0].stats.streak, 1);
        assert_eq!(ranked[0].stats.total, 1);

        // And the guard still holds: the completion is on record.
        assert_eq!(
            session.complete_habit(&id).await.unwrap(),
            CompletionOutcome::AlreadyCompleted
        );
        assert_eq!(store.update_calls.load(Ordering::SeqCst), 1);

        session.close().await;
    }
}

/// Block until a session's snapshot satisfies `pred`.
async fn wait_for(session: &Session, pred: impl Fn(&Snapshot) -> bool) {
    let mut rx = session.watch();
    loop {
        if pred(&rx.borrow()) {
            return;
        }
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("snapshot did not converge in time")
            .expect("snapshot channel closed");
    }
}
