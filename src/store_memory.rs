//! In-process store implementation.
//!
//! Rows live in memory behind a mutex, every mutation is appended to a
//! sequenced change log, and subscribers get the same events over a
//! broadcast channel. This store backs the board server and the tests; it
//! is also usable directly for a single-process board.

use std::sync::Mutex;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agenda::{AgendaItem, RoomPatch, RoomState};
use crate::error::{BoardError, BoardResult};
use crate::models::{Note, NotePatch, DELETE_SENTINEL};
use crate::store::{
    AgendaStore, ChangeEvent, ChangeKind, RemoteStore, SequencedChange,
};

/// Broadcast capacity; a lagging subscriber misses events rather than
/// blocking the store.
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Inner {
    notes: Vec<Note>,
    agenda: Vec<AgendaItem>,
    room: RoomState,
    log: Vec<SequencedChange>,
    next_seq: u64,
}

/// In-memory store with a sequenced change log and broadcast feed.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            feed,
        }
    }

    /// Replace the agenda list (server-side seeding).
    pub fn seed_agenda(&self, items: Vec<AgendaItem>) {
        self.inner.lock().unwrap().agenda = items;
    }

    /// Sequence number of the newest change-log entry.
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().unwrap().next_seq
    }

    /// Change-log entries after `seq`, oldest first, at most `limit`.
    ///
    /// Returns the entries and the log's newest sequence number so a poller
    /// can tell whether it caught up.
    pub fn changes_after(&self, seq: u64, limit: usize) -> (Vec<SequencedChange>, u64) {
        let inner = self.inner.lock().unwrap();
        let changes = inner
            .log
            .iter()
            .filter(|change| change.seq > seq)
            .take(limit)
            .cloned()
            .collect();
        (changes, inner.next_seq)
    }

    fn record(&self, inner: &mut Inner, kind: ChangeKind, note: Note) {
        inner.next_seq += 1;
        let event = ChangeEvent { kind, note };
        inner.log.push(SequencedChange {
            seq: inner.next_seq,
            event: event.clone(),
        });
        // No receivers is fine; the log keeps the history for pollers.
        let _ = self.feed.send(event);
    }
}

impl RemoteStore for MemoryStore {
    async fn insert_note(&self, note: &Note) -> BoardResult<Note> {
        let mut inner = self.inner.lock().unwrap();
        if inner.notes.iter().any(|existing| existing.id == note.id) {
            return Err(BoardError::remote(format!(
                "duplicate identity {}",
                note.id
            )));
        }
        inner.notes.push(note.clone());
        self.record(&mut inner, ChangeKind::Insert, note.clone());
        Ok(note.clone())
    }

    async fn insert_notes(&self, notes: &[Note]) -> BoardResult<Vec<Note>> {
        let mut inner = self.inner.lock().unwrap();
        for note in notes {
            if inner.notes.iter().any(|existing| existing.id == note.id) {
                return Err(BoardError::remote(format!(
                    "duplicate identity {}",
                    note.id
                )));
            }
        }
        for note in notes {
            inner.notes.push(note.clone());
            self.record(&mut inner, ChangeKind::Insert, note.clone());
        }
        Ok(notes.to_vec())
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> BoardResult<Option<Note>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.notes.iter().position(|note| note.id == id) else {
            return Ok(None);
        };
        inner.notes[idx].apply(patch);
        let updated = inner.notes[idx].clone();
        self.record(&mut inner, ChangeKind::Update, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_note(&self, id: Uuid) -> BoardResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.notes.iter().position(|note| note.id == id) else {
            return Ok(false);
        };
        let removed = inner.notes.remove(idx);
        self.record(&mut inner, ChangeKind::Delete, removed);
        Ok(true)
    }

    async fn delete_all_notes(&self) -> BoardResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for note in inner.notes.drain(..) {
            if note.id == DELETE_SENTINEL {
                kept.push(note);
            } else {
                removed.push(note);
            }
        }
        inner.notes = kept;
        let count = removed.len() as u64;
        for note in removed {
            self.record(&mut inner, ChangeKind::Delete, note);
        }
        Ok(count)
    }

    async fn fetch_notes(&self) -> BoardResult<Vec<Note>> {
        let inner = self.inner.lock().unwrap();
        let mut notes = inner.notes.clone();
        notes.sort_by_key(|note| note.created_at);
        Ok(notes)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

impl AgendaStore for MemoryStore {
    async fn fetch_agenda(&self) -> BoardResult<Vec<AgendaItem>> {
        Ok(self.inner.lock().unwrap().agenda.clone())
    }

    async fn fetch_room_state(&self) -> BoardResult<RoomState> {
        Ok(self.inner.lock().unwrap().room.clone())
    }

    async fn update_room_state(&self, patch: &RoomPatch) -> BoardResult<RoomState> {
        let mut inner = self.inner.lock().unwrap();
        inner.room.apply(patch);
        Ok(inner.room.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteColor;

    fn note(text: &str) -> Note {
        Note::new(text, NoteColor::Red, 0.0, 0.0)
    }

    #[tokio::test]
    async fn test_insert_feeds_subscribers_and_log() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe();

        let n = note("a");
        store.insert_note(&n).await.unwrap();

        let event = feed.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.note.id, n.id);

        let (changes, last_seq) = store.changes_after(0, 100);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].seq, 1);
        assert_eq!(last_seq, 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let n = note("a");
        store.insert_note(&n).await.unwrap();

        assert!(store.insert_note(&n).await.is_err());
    }

    #[tokio::test]
    async fn test_update_broadcasts_full_row() {
        let store = MemoryStore::new();
        let n = note("a");
        store.insert_note(&n).await.unwrap();

        let mut feed = store.subscribe();
        let updated = store
            .update_note(n.id, &NotePatch::text("edited"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.text, "edited");

        let event = feed.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.note.text, "edited");
        assert_eq!(event.note.x, n.x);
    }

    #[tokio::test]
    async fn test_update_unknown_row_is_none() {
        let store = MemoryStore::new();
        let got = store
            .update_note(Uuid::now_v7(), &NotePatch::text("x"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_delete_all_spares_sentinel() {
        let store = MemoryStore::new();
        let mut sentinel = note("keep");
        sentinel.id = DELETE_SENTINEL;
        store.insert_note(&sentinel).await.unwrap();
        store.insert_note(&note("a")).await.unwrap();
        store.insert_note(&note("b")).await.unwrap();

        let removed = store.delete_all_notes().await.unwrap();
        assert_eq!(removed, 2);

        let remaining = store.fetch_notes().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, DELETE_SENTINEL);
    }

    #[tokio::test]
    async fn test_fetch_orders_by_creation() {
        let store = MemoryStore::new();
        let mut older = note("old");
        older.created_at = older.created_at - chrono::Duration::seconds(60);
        store.insert_note(&note("new")).await.unwrap();
        store.insert_note(&older).await.unwrap();

        let notes = store.fetch_notes().await.unwrap();
        assert_eq!(notes[0].text, "old");
        assert_eq!(notes[1].text, "new");
    }

    #[tokio::test]
    async fn test_changes_after_tails_the_log() {
        let store = MemoryStore::new();
        store.insert_note(&note("a")).await.unwrap();
        store.insert_note(&note("b")).await.unwrap();
        store.insert_note(&note("c")).await.unwrap();

        let (changes, last_seq) = store.changes_after(1, 100);
        assert_eq!(last_seq, 3);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].seq, 2);
        assert_eq!(changes[1].seq, 3);

        let (changes, _) = store.changes_after(3, 100);
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_room_state_patch() {
        let store = MemoryStore::new();
        let room = store
            .update_room_state(&RoomPatch::agenda("topic-1"))
            .await
            .unwrap();
        assert_eq!(room.current_agenda_id.as_deref(), Some("topic-1"));
        assert!(!room.is_presenting());
    }
}
