//! Remote store interface for the shared board tables.
//!
//! The remote table is the sole arbiter of durable state; every client's
//! local collection is a cache of it. This module defines the operations a
//! client issues against the notes table, the change feed it consumes, and
//! the single decode boundary that turns untyped remote payloads into typed
//! rows.
//!
//! Implementations:
//! - [`crate::store_http`] - board server protocol over HTTP
//! - [`crate::store_memory`] - in-process store backing the server and tests

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agenda::{AgendaItem, RoomPatch, RoomState};
use crate::error::BoardResult;
use crate::models::{Note, NotePatch};

/// Kind of row change delivered by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

/// One note-row change. INSERT and UPDATE carry the new row, DELETE the old
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub note: Note,
}

impl ChangeEvent {
    pub fn insert(note: Note) -> Self {
        Self {
            kind: ChangeKind::Insert,
            note,
        }
    }

    pub fn update(note: Note) -> Self {
        Self {
            kind: ChangeKind::Update,
            note,
        }
    }

    pub fn delete(note: Note) -> Self {
        Self {
            kind: ChangeKind::Delete,
            note,
        }
    }
}

/// A change-log entry with its position in the log, as served by
/// `/board/changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedChange {
    pub seq: u64,
    #[serde(flatten)]
    pub event: ChangeEvent,
}

/// Decode an untyped note-row payload.
///
/// This is the validation boundary for remote data: the payload shape
/// carries no compile-time guarantee, so malformed rows are dropped and
/// logged here rather than propagated into the collection.
pub fn decode_note_row(value: serde_json::Value) -> Option<Note> {
    match serde_json::from_value::<Note>(value) {
        Ok(note) => Some(note),
        Err(err) => {
            tracing::warn!("Dropping malformed note row: {}", err);
            None
        }
    }
}

/// Decode a list of untyped note rows, keeping the well-formed ones.
pub fn decode_note_rows(values: Vec<serde_json::Value>) -> Vec<Note> {
    values.into_iter().filter_map(decode_note_row).collect()
}

/// Remote notes-table operations.
///
/// All mutations are asynchronous round-trips; callers apply their
/// optimistic local change first and reconcile with the result.
pub trait RemoteStore: Send + Sync {
    /// Insert a row. Returns the stored row, identity included.
    fn insert_note(&self, note: &Note) -> impl Future<Output = BoardResult<Note>> + Send;

    /// Insert a batch of rows in one request.
    fn insert_notes(&self, notes: &[Note])
        -> impl Future<Output = BoardResult<Vec<Note>>> + Send;

    /// Partially update the row with the given identity.
    ///
    /// Returns the updated row, or `None` when no row matched (a benign race
    /// with a concurrent delete).
    fn update_note(
        &self,
        id: Uuid,
        patch: &NotePatch,
    ) -> impl Future<Output = BoardResult<Option<Note>>> + Send;

    /// Delete the row with the given identity. Returns whether a row matched.
    fn delete_note(&self, id: Uuid) -> impl Future<Output = BoardResult<bool>> + Send;

    /// Delete every row except the reserved all-zero sentinel identity.
    /// Returns the number of rows removed.
    fn delete_all_notes(&self) -> impl Future<Output = BoardResult<u64>> + Send;

    /// All rows, ordered by creation time.
    fn fetch_notes(&self) -> impl Future<Output = BoardResult<Vec<Note>>> + Send;

    /// Subscribe to the change feed for the notes table.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Remote agenda and room-state operations.
pub trait AgendaStore: Send + Sync {
    /// All agenda items (unsorted; callers order by `ord`).
    fn fetch_agenda(&self) -> impl Future<Output = BoardResult<Vec<AgendaItem>>> + Send;

    /// The shared room-state row.
    fn fetch_room_state(&self) -> impl Future<Output = BoardResult<RoomState>> + Send;

    /// Partially update the room state. Returns the resulting row.
    fn update_room_state(
        &self,
        patch: &RoomPatch,
    ) -> impl Future<Output = BoardResult<RoomState>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteColor;

    #[test]
    fn test_decode_drops_malformed_rows() {
        let good = serde_json::to_value(Note::new("ok", NoteColor::Red, 0.0, 0.0)).unwrap();
        let bad = serde_json::json!({ "id": "not-a-uuid", "x": 0.0, "y": 0.0 });
        let worse = serde_json::json!("just a string");

        let notes = decode_note_rows(vec![good, bad, worse]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "ok");
    }

    #[test]
    fn test_change_kind_wire_names() {
        let event = ChangeEvent::insert(Note::new("n", NoteColor::Red, 0.0, 0.0));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "INSERT");
    }

    #[test]
    fn test_sequenced_change_flattens_event() {
        let change = SequencedChange {
            seq: 7,
            event: ChangeEvent::delete(Note::new("n", NoteColor::Blue, 0.0, 0.0)),
        };
        let value = serde_json::to_value(&change).unwrap();

        assert_eq!(value["seq"], 7);
        assert_eq!(value["kind"], "DELETE");
        assert!(value["note"].is_object());
    }
}
