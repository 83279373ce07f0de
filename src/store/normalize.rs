/// Row normalization between store rows and domain entities
///
/// All field names and timestamp formats live here. The rest of the crate
/// moves typed entities around; nothing outside this module reads or writes
/// raw row fields.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{Completion, CompletionId, Frequency, Habit, HabitId, NewHabit, UserId};
use crate::store::Row;

/// Row field holding the owning user's id, on both collections.
pub const FIELD_USER_ID: &str = "user_id";
/// Row field holding a completion's timestamp.
pub const FIELD_COMPLETED_AT: &str = "completed_at";

/// Errors produced when a store row cannot be turned into an entity
#[derive(thiserror::Error, Debug)]
pub enum RowError {
    #[error("Failed to decode {collection} row {id}: {source}")]
    Decode {
        collection: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct HabitFields {
    user_id: String,
    title: String,
    #[serde(default)]
    description: String,
    frequency: Frequency,
    #[serde(default)]
    streak_count: u32,
    #[serde(default)]
    last_completed: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CompletionFields {
    user_id: String,
    habit_id: String,
    completed_at: DateTime<Utc>,
}

/// Decode one habit row.
pub fn habit_from_row(row: &Row) -> Result<Habit, RowError> {
    let fields: HabitFields = decode(row, "habits")?;
    Ok(Habit {
        id: HabitId::new(row.id.clone()),
        user_id: UserId::new(fields.user_id),
        title: fields.title,
        description: fields.description,
        frequency: fields.frequency,
        streak_count: fields.streak_count,
        last_completed: fields.last_completed,
        created_at: fields.created_at,
    })
}

/// Decode one completion row.
pub fn completion_from_row(row: &Row) -> Result<Completion, RowError> {
    let fields: CompletionFields = decode(row, "completions")?;
    Ok(Completion {
        id: CompletionId::new(row.id.clone()),
        user_id: UserId::new(fields.user_id),
        habit_id: HabitId::new(fields.habit_id),
        completed_at: fields.completed_at,
    })
}

fn decode<T: DeserializeOwned>(row: &Row, collection: &'static str) -> Result<T, RowError> {
    serde_json::from_value(Value::Object(row.data.clone())).map_err(|source| RowError::Decode {
        collection,
        id: row.id.clone(),
        source,
    })
}

/// Encode a habit draft into row fields for creation.
///
/// A fresh habit starts with a zero streak count and no completion on
/// record; the first completion writes both.
pub fn habit_fields(draft: &NewHabit) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(FIELD_USER_ID.into(), string(draft.user_id.as_str()));
    data.insert("title".into(), string(&draft.title));
    data.insert("description".into(), string(&draft.description));
    data.insert("frequency".into(), string(draft.frequency.as_str()));
    data.insert("streak_count".into(), Value::from(0u32));
    data.insert("last_completed".into(), Value::Null);
    data.insert("created_at".into(), timestamp(draft.created_at));
    data
}

/// Encode a completion into row fields for creation.
pub fn completion_fields(
    user_id: &UserId,
    habit_id: &HabitId,
    completed_at: DateTime<Utc>,
) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(FIELD_USER_ID.into(), string(user_id.as_str()));
    data.insert("habit_id".into(), string(habit_id.as_str()));
    data.insert(FIELD_COMPLETED_AT.into(), timestamp(completed_at));
    data
}

/// Encode the habit row patch written after a completion is recorded.
pub fn habit_progress_fields(
    streak_count: u32,
    last_completed: DateTime<Utc>,
) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("streak_count".into(), Value::from(streak_count));
    data.insert("last_completed".into(), timestamp(last_completed));
    data
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

fn timestamp(t: DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
}
