//! Local note collection and reconciliation.
//!
//! The collection is this client's projection of the remote notes table:
//! optimistic mutations land immediately, and remote change notifications
//! merge in as they arrive, keyed by note identity. No ordering holds
//! between a local mutation and its echoed remote event, so every merge is
//! idempotent per identity - replaying an event leaves the collection
//! unchanged.
//!
//! Each optimistic mutation records a pending marker holding the last
//! confirmed state for its identity. The marker is cleared when the paired
//! remote request succeeds (or its echo arrives) and reverted when the
//! request fails, so a failed request never leaves the collection silently
//! diverged from the table.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Note, NotePatch};
use crate::store::{ChangeEvent, ChangeKind};

/// Last confirmed state for an identity with an in-flight mutation.
#[derive(Debug, Clone)]
enum Pending {
    /// Optimistic insert: no confirmed state existed before.
    Insert,
    /// Optimistic update: the note as last confirmed.
    Update(Box<Note>),
    /// Optimistic delete: the removed note and the index it held.
    Delete(Box<Note>, usize),
}

/// In-memory, insertion-ordered collection of notes.
#[derive(Debug, Default)]
pub struct Board {
    notes: Vec<Note>,
    pending: HashMap<Uuid, Pending>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }

    /// Number of mutations still awaiting their remote outcome.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    /// Lowest y coordinate not covered by any note; new document content is
    /// placed below this line.
    pub fn bottom_y(&self) -> Option<f64> {
        self.notes
            .iter()
            .map(|note| note.bottom())
            .fold(None, |acc, bottom| match acc {
                Some(max) if max >= bottom => Some(max),
                _ => Some(bottom),
            })
    }

    /// Replace the whole collection with rows fetched from the remote table.
    pub fn reset(&mut self, notes: Vec<Note>) {
        self.notes = notes;
        self.pending.clear();
    }

    /// Append a note immediately (optimistic insert).
    pub fn apply_local_insert(&mut self, note: Note) {
        self.pending.entry(note.id).or_insert(Pending::Insert);
        self.notes.push(note);
    }

    /// Shallow-merge partial fields into the matching note, preserving every
    /// other field. No-op when the identity is not present.
    pub fn apply_local_update(&mut self, id: Uuid, patch: &NotePatch) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        if !self.pending.contains_key(&id) {
            self.pending
                .insert(id, Pending::Update(Box::new(self.notes[idx].clone())));
        }
        self.notes[idx].apply(patch);
        true
    }

    /// Remove the matching note immediately. No-op when absent.
    pub fn apply_local_delete(&mut self, id: Uuid) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let note = self.notes.remove(idx);
        // The confirmed state is the pre-update snapshot if one was pending.
        let prior = match self.pending.remove(&id) {
            Some(Pending::Update(prior)) => prior,
            _ => Box::new(note),
        };
        self.pending.insert(id, Pending::Delete(prior, idx));
        true
    }

    /// Clear the pending marker for an identity: its remote request
    /// succeeded, or the matching echo arrived.
    pub fn confirm(&mut self, id: Uuid) {
        self.pending.remove(&id);
    }

    /// Restore the last confirmed state for an identity whose remote request
    /// failed.
    pub fn revert(&mut self, id: Uuid) {
        match self.pending.remove(&id) {
            Some(Pending::Insert) => {
                if let Some(idx) = self.index_of(id) {
                    self.notes.remove(idx);
                }
            }
            Some(Pending::Update(prior)) => {
                if let Some(idx) = self.index_of(id) {
                    self.notes[idx] = *prior;
                }
            }
            Some(Pending::Delete(prior, idx)) => {
                let idx = idx.min(self.notes.len());
                self.notes.insert(idx, *prior);
            }
            None => {}
        }
    }

    /// Merge one remote change notification into the collection.
    ///
    /// INSERT appends unless the identity is already present (the echo of an
    /// optimistic insert that already landed). UPDATE replaces the matching
    /// entry wholesale with the incoming row. DELETE removes the matching
    /// entry. UPDATE/DELETE for an unknown identity are a benign race with a
    /// local delete and are ignored. Any event for an identity counts as its
    /// confirmation.
    pub fn apply_remote_change(&mut self, event: &ChangeEvent) {
        let id = event.note.id;
        match event.kind {
            ChangeKind::Insert => {
                if self.index_of(id).is_none() {
                    self.notes.push(event.note.clone());
                }
            }
            ChangeKind::Update => {
                if let Some(idx) = self.index_of(id) {
                    self.notes[idx] = event.note.clone();
                }
            }
            ChangeKind::Delete => {
                if let Some(idx) = self.index_of(id) {
                    self.notes.remove(idx);
                }
            }
        }
        self.confirm(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteColor, Reply};

    fn note(text: &str) -> Note {
        Note::new(text, NoteColor::Red, 50.0, 150.0)
    }

    #[test]
    fn test_insert_then_echo_yields_one_entry() {
        let mut board = Board::new();
        let n = note("a");

        board.apply_local_insert(n.clone());
        board.apply_remote_change(&ChangeEvent::insert(n.clone()));

        assert_eq!(board.len(), 1);
        assert!(!board.has_pending(n.id));
    }

    #[test]
    fn test_insert_replay_is_idempotent() {
        let mut board = Board::new();
        let n = note("a");

        board.apply_remote_change(&ChangeEvent::insert(n.clone()));
        board.apply_remote_change(&ChangeEvent::insert(n.clone()));

        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_update_echo_is_idempotent() {
        let mut board = Board::new();
        let mut n = note("a");
        board.apply_local_insert(n.clone());
        board.confirm(n.id);

        n.text = "edited".to_string();
        board.apply_remote_change(&ChangeEvent::update(n.clone()));
        let after_once = board.notes().to_vec();

        board.apply_remote_change(&ChangeEvent::update(n.clone()));
        assert_eq!(board.notes(), &after_once[..]);
        assert_eq!(board.get(n.id).unwrap().text, "edited");
    }

    #[test]
    fn test_update_for_unknown_identity_is_ignored() {
        let mut board = Board::new();
        board.apply_remote_change(&ChangeEvent::update(note("ghost")));
        assert!(board.is_empty());
    }

    #[test]
    fn test_partial_update_preserves_untouched_fields() {
        let mut board = Board::new();
        let mut n = note("before");
        n.replies.push(Reply::new(n.id, "hi", None));
        let snapshot = n.clone();
        board.apply_local_insert(n.clone());
        board.confirm(n.id);

        board.apply_local_update(n.id, &NotePatch::text("new"));

        let after = board.get(n.id).unwrap();
        assert_eq!(after.text, "new");
        assert_eq!(after.x, snapshot.x);
        assert_eq!(after.y, snapshot.y);
        assert_eq!(after.width, snapshot.width);
        assert_eq!(after.height, snapshot.height);
        assert_eq!(after.color, snapshot.color);
        assert_eq!(after.replies, snapshot.replies);
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let mut board = Board::new();
        let a = note("a");
        let b = note("b");
        board.reset(vec![a.clone(), b.clone()]);

        assert!(board.apply_local_delete(a.id));

        assert_eq!(board.len(), 1);
        assert_eq!(board.notes()[0].id, b.id);
    }

    #[test]
    fn test_delete_echo_after_local_delete_is_noop() {
        let mut board = Board::new();
        let a = note("a");
        board.reset(vec![a.clone()]);

        board.apply_local_delete(a.id);
        board.apply_remote_change(&ChangeEvent::delete(a.clone()));

        assert!(board.is_empty());
        assert!(!board.has_pending(a.id));
    }

    #[test]
    fn test_revert_failed_insert() {
        let mut board = Board::new();
        let n = note("a");

        board.apply_local_insert(n.clone());
        board.revert(n.id);

        assert!(board.is_empty());
    }

    #[test]
    fn test_revert_failed_update_restores_confirmed_state() {
        let mut board = Board::new();
        let n = note("confirmed");
        board.reset(vec![n.clone()]);

        board.apply_local_update(n.id, &NotePatch::text("optimistic"));
        board.apply_local_update(n.id, &NotePatch::position(9.0, 9.0));
        board.revert(n.id);

        let after = board.get(n.id).unwrap();
        assert_eq!(after.text, "confirmed");
        assert_eq!(after.x, 50.0);
    }

    #[test]
    fn test_revert_failed_delete_restores_position_in_order() {
        let mut board = Board::new();
        let a = note("a");
        let b = note("b");
        let c = note("c");
        board.reset(vec![a.clone(), b.clone(), c.clone()]);

        board.apply_local_delete(b.id);
        board.revert(b.id);

        let ids: Vec<_> = board.notes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_echo_confirms_pending_update() {
        let mut board = Board::new();
        let n = note("a");
        board.reset(vec![n.clone()]);

        board.apply_local_update(n.id, &NotePatch::text("edited"));
        assert!(board.has_pending(n.id));

        let mut echoed = n.clone();
        echoed.text = "edited".to_string();
        board.apply_remote_change(&ChangeEvent::update(echoed));

        assert!(!board.has_pending(n.id));
        // A later revert must not resurrect the pre-update snapshot.
        board.revert(n.id);
        assert_eq!(board.get(n.id).unwrap().text, "edited");
    }

    #[test]
    fn test_bottom_y() {
        let mut board = Board::new();
        assert!(board.bottom_y().is_none());

        let mut a = note("a");
        a.y = 100.0;
        a.height = 50.0;
        let mut b = note("b");
        b.y = 400.0;
        b.height = 120.0;
        board.reset(vec![a, b]);

        assert_eq!(board.bottom_y(), Some(520.0));
    }
}
