/// Demo binary for the habit sync client
///
/// This runs the whole stack against the in-memory backend: sign-up, habit
/// creation, seeded completion history, a second "device" session syncing
/// live, the once-per-day completion guard, and the best-streak podium.
/// Logs go to stderr; the demo's output goes to stdout.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use futures::future::try_join_all;
use tracing::info;

use habit_sync::store::normalize::completion_fields;
use habit_sync::store::Collection;
use habit_sync::{
    HabitId, HabitSyncClient, MemoryAuth, MemoryStore, RemoteStore, Session, StoreError,
    SyncOptions, UserId,
};

/// Command line arguments for the sync demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debounce window for change-driven refreshes, in milliseconds
    #[arg(long, default_value_t = 50)]
    debounce_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("habit_sync={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting habit sync demo");

    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(MemoryAuth::new());
    let options = SyncOptions {
        debounce: Duration::from_millis(args.debounce_ms),
        ..SyncOptions::default()
    };
    let client = HabitSyncClient::with_options(store.clone(), auth, options);

    let session = client.sign_up("demo@example.test", "super-secret").await?;
    let user_id = session.user().id.clone();

    // Three habits, created concurrently.
    let drafts = [
        ("Morning Run", "Around the block before work"),
        ("Read", "Ten pages minimum"),
        ("Meditate", ""),
    ];
    let ids = try_join_all(
        drafts
            .iter()
            .map(|(title, desc)| session.create_habit(title, desc, habit_sync::Frequency::Daily)),
    )
    .await?;
    wait_for_counts(&session, 3, 0).await?;
    let (run_id, read_id, meditate_id) = (&ids[0], &ids[1], &ids[2]);

    // Back-date some history straight into the store, the way rows written
    // from another device would appear. The open session picks them up via
    // its realtime feed.
    seed_history(&store, &user_id, run_id, &[4, 3, 2, 1]).await?;
    seed_history(&store, &user_id, read_id, &[9, 8, 1]).await?;
    seed_history(&store, &user_id, meditate_id, &[6, 5]).await?;
    wait_for_counts(&session, 3, 9).await?;

    // A second session on the same account, as another device would open.
    let device_b = client.sign_in("demo@example.test", "super-secret").await?;
    wait_for_counts(&device_b, 3, 9).await?;

    let first = session.complete_habit(run_id).await?;
    println!("Completing \"Morning Run\": {:?}", first);
    let again = session.complete_habit(run_id).await?;
    println!("Completing \"Morning Run\" again: {:?}", again);

    // Both devices converge on the same history.
    wait_for_counts(&session, 3, 10).await?;
    wait_for_counts(&device_b, 3, 10).await?;

    println!();
    println!("Completed today (device B): {}", device_b.completed_today().len());
    println!();
    println!("Top habits by best streak:");
    for (place, entry) in device_b.podium().iter().enumerate() {
        println!(
            "  {}. {:<12} best {:>2}  current {:>2}  total {:>2}",
            place + 1,
            entry.habit.title,
            entry.stats.best_streak,
            entry.stats.streak,
            entry.stats.total,
        );
    }

    device_b.close().await;
    client.sign_out(session).await?;
    info!("Demo finished");
    Ok(())
}

/// Write completion rows for `days_ago` directly into the store.
async fn seed_history(
    store: &MemoryStore,
    user_id: &UserId,
    habit_id: &HabitId,
    days_ago: &[i64],
) -> Result<(), StoreError> {
    for &ago in days_ago {
        let at = Utc::now() - chrono::Duration::days(ago);
        store
            .create_row(
                Collection::Completions,
                completion_fields(user_id, habit_id, at),
            )
            .await?;
    }
    Ok(())
}

/// Block until a session's snapshot carries at least the given row counts.
async fn wait_for_counts(
    session: &Session,
    habits: usize,
    completions: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rx = session.watch();
    loop {
        {
            let snapshot = rx.borrow();
            if snapshot.habits.len() >= habits && snapshot.completions.len() >= completions {
                return Ok(());
            }
        }
        tokio::time::timeout(Duration::from_secs(2), rx.changed()).await??;
    }
}
