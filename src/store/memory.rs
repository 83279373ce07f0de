/// In-memory implementation of the remote store
///
/// This backend keeps rows in process memory and fans realtime events out to
/// subscribers over channels. It behaves like the network store from the
/// client's point of view: store-assigned ids, owner-scoped queries and
/// per-channel event delivery, which makes it the backend for tests and the
/// demo binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::store::normalize::FIELD_USER_ID;
use crate::store::{
    Channel, Collection, RemoteStore, Row, RowFilter, StoreError, StoreEvent, Subscription,
};

/// Memory-backed store with realtime fanout.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<&'static str, Vec<Row>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

struct Subscriber {
    id: u64,
    channel: Channel,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many realtime subscriptions are currently open.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }
}

impl Inner {
    fn rows_mut(&mut self, collection: Collection) -> &mut Vec<Row> {
        self.tables.entry(collection.table_id()).or_default()
    }

    /// Deliver a row event to every live subscriber on the matching channel.
    fn emit(&mut self, collection: Collection, row: &Row, op: &str) {
        let owner = row_owner(row);
        let event = StoreEvent {
            events: vec![
                format!("tables.{}.rows.{}.{}", collection.table_id(), row.id, op),
                format!("tables.*.rows.*.{}", op),
            ],
            payload: row_payload(row),
        };

        self.subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in &self.subscribers {
            let scoped = sub.channel.collection == collection
                && Some(sub.channel.owner.as_str()) == owner.as_deref();
            if scoped {
                // Receiver may drop between retain and send; ignore.
                let _ = sub.tx.send(event.clone());
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_rows(
        &self,
        collection: Collection,
        filter: &RowFilter,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = inner
            .rows_mut(collection)
            .iter()
            .filter(|row| row_owner(row).as_deref() == Some(filter.owner.as_str()))
            .filter(|row| match &filter.window {
                None => true,
                Some(window) => row
                    .data
                    .get(&window.field)
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| {
                        let t = t.to_utc();
                        window.start <= t && t < window.end
                    })
                    .unwrap_or(false),
            })
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn create_row(
        &self,
        collection: Collection,
        data: Map<String, Value>,
    ) -> Result<Row, StoreError> {
        let row = Row {
            id: Uuid::new_v4().to_string(),
            data,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.rows_mut(collection).push(row.clone());
        inner.emit(collection, &row, "create");
        tracing::debug!("Created {} row {}", collection, row.id);
        Ok(row)
    }

    async fn update_row(
        &self,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Row, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = inner.rows_mut(collection);
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.table_id(),
                id: id.to_string(),
            })?;

        for (key, value) in patch {
            row.data.insert(key, value);
        }
        let updated = row.clone();

        inner.emit(collection, &updated, "update");
        tracing::debug!("Updated {} row {}", collection, id);
        Ok(updated)
    }

    async fn delete_row(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = inner.rows_mut(collection);
        let position =
            rows.iter()
                .position(|row| row.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.table_id(),
                    id: id.to_string(),
                })?;
        let row = rows.remove(position);

        inner.emit(collection, &row, "delete");
        tracing::debug!("Deleted {} row {}", collection, id);
        Ok(())
    }

    async fn subscribe(&self, channel: Channel) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push(Subscriber {
            id,
            channel: channel.clone(),
            tx,
        });
        tracing::debug!("Subscribed to {} for {}", channel.name(), channel.owner);

        let store = Arc::clone(&self.inner);
        let unsubscribe = Box::new(move || {
            let mut inner = store.lock().unwrap();
            inner.subscribers.retain(|sub| sub.id != id);
            tracing::debug!("Unsubscribed from channel {}", id);
        });
        Ok(Subscription::new(rx, unsubscribe))
    }
}

fn row_owner(row: &Row) -> Option<String> {
    row.data
        .get(FIELD_USER_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn row_payload(row: &Row) -> Value {
    let mut data = row.data.clone();
    data.insert("id".to_string(), Value::String(row.id.clone()));
    Value::Object(data)
}
