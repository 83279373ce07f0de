/// Remote store abstraction
///
/// This module defines the interface to the backend that owns habit and
/// completion rows: CRUD on schemaless rows plus realtime change
/// subscriptions. The sync controller is written against the [`RemoteStore`]
/// trait, so the in-memory backend used in tests and demos is exercised by
/// exactly the same code paths a network backend would be.

pub mod memory;
pub mod normalize;

pub use memory::MemoryStore;
pub use normalize::{completion_fields, completion_from_row, habit_fields, habit_from_row, RowError};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::domain::{DayWindow, UserId};

/// Errors that can occur while talking to the remote store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Network(String),

    #[error("Store rejected the write: {0}")]
    Constraint(String),

    #[error("Row not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Malformed row: {0}")]
    Row(#[from] RowError),
}

/// The two row collections the client works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Habits,
    Completions,
}

impl Collection {
    /// Both collections, in fetch order.
    pub const ALL: [Collection; 2] = [Collection::Habits, Collection::Completions];

    /// The table id used in channel names and event strings.
    pub fn table_id(&self) -> &'static str {
        match self {
            Collection::Habits => "habits",
            Collection::Completions => "completions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_id())
    }
}

/// A realtime channel: one collection's row events, scoped to one owner.
///
/// The store only delivers events for rows the owner can read, so a channel
/// per user never leaks another user's activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub collection: Collection,
    pub owner: UserId,
}

impl Channel {
    pub fn new(collection: Collection, owner: UserId) -> Self {
        Self { collection, owner }
    }

    /// Wire name of the channel, e.g. `tables.habits.rows`.
    pub fn name(&self) -> String {
        format!("tables.{}.rows", self.collection.table_id())
    }
}

/// A schemaless row as the store returns it.
///
/// The id lives outside `data`, mirroring backends that reserve a system id
/// field. Field decoding happens in [`normalize`], never at call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub data: Map<String, Value>,
}

/// Server-side filter for [`RemoteStore::list_rows`].
///
/// Every query is owner-scoped; a time window on one field is optional and
/// half-open, `start <= value < end`.
#[derive(Debug, Clone)]
pub struct RowFilter {
    pub owner: UserId,
    pub window: Option<TimeWindow>,
}

/// Half-open time restriction on a single row field.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub field: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RowFilter {
    /// All rows belonging to `owner`.
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner,
            window: None,
        }
    }

    /// Restrict `field` to the given day window.
    pub fn within(mut self, field: impl Into<String>, window: DayWindow) -> Self {
        self.window = Some(TimeWindow {
            field: field.into(),
            start: window.start,
            end: window.end,
        });
        self
    }
}

/// One realtime notification from the store.
///
/// `events` carries qualified event strings such as
/// `tables.habits.rows.abc.create`, possibly several per notification and
/// possibly wildcarded. The payload is the affected row, but subscribers
/// treat events as refresh hints only and refetch instead of patching.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub events: Vec<String>,
    pub payload: Value,
}

const MUTATION_SUFFIXES: [&str; 3] = [".create", ".update", ".delete"];

impl StoreEvent {
    /// Whether any event string reports a row create, update or delete.
    ///
    /// Discrimination is by suffix, so concrete and wildcard event forms
    /// match alike and unrelated notifications on the same channel do not.
    pub fn is_row_mutation(&self) -> bool {
        self.events
            .iter()
            .any(|e| MUTATION_SUFFIXES.iter().any(|suffix| e.ends_with(suffix)))
    }
}

/// An open realtime subscription.
///
/// Events arrive through [`recv`](Self::recv). Dropping the subscription
/// releases the channel server-side, so teardown cannot be forgotten on any
/// exit path.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<StoreEvent>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<StoreEvent>,
        unsubscribe: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            events,
            unsubscribe: Some(unsubscribe),
        }
    }

    /// Next notification, or `None` once the store side closed the channel.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Interface to the backend owning habit and completion rows.
///
/// This trait allows swapping the in-memory backend for a network one while
/// keeping the sync controller unchanged.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List rows matching `filter`.
    async fn list_rows(
        &self,
        collection: Collection,
        filter: &RowFilter,
    ) -> Result<Vec<Row>, StoreError>;

    /// Create a row; the store assigns the id and returns the stored row.
    async fn create_row(
        &self,
        collection: Collection,
        data: Map<String, Value>,
    ) -> Result<Row, StoreError>;

    /// Merge `patch` into an existing row's fields.
    async fn update_row(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Row, StoreError>;

    /// Delete a row. Deleting an absent row reports [`StoreError::NotFound`].
    async fn delete_row(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Open a realtime subscription on `channel`.
    async fn subscribe(&self, channel: Channel) -> Result<Subscription, StoreError>;
}
