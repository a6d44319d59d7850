//! Note lifecycle operations.
//!
//! Every operation applies its optimistic local mutation first, then issues
//! the paired remote mutation. On success (or when the matching echo comes
//! back over the feed) the pending marker is cleared; on failure the
//! optimistic change is reverted to the last confirmed state and the error
//! is returned for the caller to surface. The UI stays instant either way.
//!
//! Operations returning `Ok(false)` hit a benign no-op: the identity was
//! absent, the text was unchanged, or the note refuses the gesture (locked
//! and document notes are not draggable, document notes ignore text edits).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::board::Board;
use crate::error::BoardResult;
use crate::models::{
    Note, NoteColor, NotePatch, Reply, DEFAULT_NOTE_X, DEFAULT_NOTE_Y, DELETE_SENTINEL,
    PAGE_FILE_MARGIN, PAGE_GAP_X, PAGE_GAP_Y, PAGE_GRID_COLS, PAGE_NOTE_HEIGHT, PAGE_NOTE_WIDTH,
};
use crate::store::{ChangeEvent, RemoteStore};
use crate::validation;
use crate::viewport::Viewport;
use crate::UUID_SHORT_LEN;

/// Client-side board session: the local collection plus the remote store
/// handle it reconciles against.
///
/// The store is injected rather than imported, so the reconciliation logic
/// tests against an in-memory store. The embedding application drives
/// [`BoardClient::apply_event`] from the subscription receiver on its event
/// loop.
pub struct BoardClient<S> {
    store: Arc<S>,
    board: Mutex<Board>,
}

impl<S: RemoteStore> BoardClient<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            board: Mutex::new(Board::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetch all rows ordered by creation and replace the local collection.
    pub async fn load(&self) -> BoardResult<usize> {
        let notes = self.store.fetch_notes().await?;
        let mut board = self.board.lock().unwrap();
        board.reset(notes);
        Ok(board.len())
    }

    /// Subscribe to the store's change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe()
    }

    /// Merge one change notification from the feed into the collection.
    pub fn apply_event(&self, event: &ChangeEvent) {
        self.board.lock().unwrap().apply_remote_change(event);
    }

    /// Snapshot of the current collection.
    pub fn notes(&self) -> Vec<Note> {
        self.board.lock().unwrap().notes().to_vec()
    }

    pub fn note(&self, id: Uuid) -> Option<Note> {
        self.board.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.board.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.board.lock().unwrap().is_empty()
    }

    /// Mutations still awaiting their remote outcome.
    pub fn pending_count(&self) -> usize {
        self.board.lock().unwrap().pending_count()
    }

    // Shared optimistic flows

    async fn insert_flow(&self, note: Note) -> BoardResult<Note> {
        self.board.lock().unwrap().apply_local_insert(note.clone());
        match self.store.insert_note(&note).await {
            Ok(stored) => {
                self.board.lock().unwrap().confirm(note.id);
                Ok(stored)
            }
            Err(err) => {
                tracing::warn!(
                    "Insert failed for note {}: {}",
                    &note.id_hex()[..UUID_SHORT_LEN],
                    err
                );
                self.board.lock().unwrap().revert(note.id);
                Err(err)
            }
        }
    }

    async fn update_flow(&self, id: Uuid, patch: NotePatch) -> BoardResult<bool> {
        if !self.board.lock().unwrap().apply_local_update(id, &patch) {
            return Ok(false);
        }
        match self.store.update_note(id, &patch).await {
            Ok(_) => {
                self.board.lock().unwrap().confirm(id);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(
                    "Update failed for note {}: {}",
                    &id.simple().to_string()[..UUID_SHORT_LEN],
                    err
                );
                self.board.lock().unwrap().revert(id);
                Err(err)
            }
        }
    }

    // Lifecycle operations

    /// Add a text note. Without coordinates the note lands at the default
    /// drop position.
    pub async fn add_note(
        &self,
        text: &str,
        color: NoteColor,
        at: Option<(f64, f64)>,
        icon: Option<String>,
        agenda_id: Option<String>,
    ) -> BoardResult<Note> {
        validation::validate_note_text(text)?;
        let (x, y) = at.unwrap_or((DEFAULT_NOTE_X, DEFAULT_NOTE_Y));
        validation::validate_position(x, y)?;

        let mut note = Note::new(text, color, x, y);
        note.icon = icon;
        note.agenda_id = agenda_id;
        self.insert_flow(note).await
    }

    /// Place one page of an uploaded document below the current content.
    pub async fn add_document_note(&self, file_url: &str, page_index: u32) -> BoardResult<Note> {
        let y = self.start_y_below_content();
        let note = Note::document(file_url, page_index, DEFAULT_NOTE_X, y);
        self.insert_flow(note).await
    }

    /// Lay out every page of a document in a grid below the current content.
    ///
    /// Pages are inserted locked, as background material.
    pub async fn add_document_pages(
        &self,
        file_url: &str,
        total_pages: u32,
    ) -> BoardResult<Vec<Note>> {
        if total_pages == 0 {
            return Ok(Vec::new());
        }
        let start_y = self.start_y_below_content();

        let mut pages = Vec::with_capacity(total_pages as usize);
        for i in 0..total_pages {
            let col = (i % PAGE_GRID_COLS) as f64;
            let row = (i / PAGE_GRID_COLS) as f64;
            let x = DEFAULT_NOTE_X + col * (PAGE_NOTE_WIDTH + PAGE_GAP_X);
            let y = start_y + row * (PAGE_NOTE_HEIGHT + PAGE_GAP_Y);

            let mut page = Note::document(file_url, i + 1, x, y);
            page.is_locked = true;
            pages.push(page);
        }

        {
            let mut board = self.board.lock().unwrap();
            for page in &pages {
                board.apply_local_insert(page.clone());
            }
        }
        match self.store.insert_notes(&pages).await {
            Ok(stored) => {
                let mut board = self.board.lock().unwrap();
                for page in &pages {
                    board.confirm(page.id);
                }
                Ok(stored)
            }
            Err(err) => {
                tracing::warn!("Batch insert of {} pages failed: {}", pages.len(), err);
                let mut board = self.board.lock().unwrap();
                for page in &pages {
                    board.revert(page.id);
                }
                Err(err)
            }
        }
    }

    fn start_y_below_content(&self) -> f64 {
        self.board
            .lock()
            .unwrap()
            .bottom_y()
            .unwrap_or(DEFAULT_NOTE_Y)
            + PAGE_FILE_MARGIN
    }

    /// Move a note to a new world position (drag-end, not every drag frame).
    /// Locked and document notes refuse the move.
    pub async fn move_note(&self, id: Uuid, x: f64, y: f64) -> BoardResult<bool> {
        validation::validate_position(x, y)?;
        let draggable = self.board.lock().unwrap().get(id).map(Note::draggable);
        match draggable {
            Some(true) => self.update_flow(id, NotePatch::position(x, y)).await,
            _ => Ok(false),
        }
    }

    /// Move a note by a drag delta measured in screen pixels.
    ///
    /// The delta is divided by the viewport scale: stored positions are
    /// world coordinates, pointer deltas are not.
    pub async fn move_by(
        &self,
        id: Uuid,
        screen_dx: f64,
        screen_dy: f64,
        viewport: &Viewport,
    ) -> BoardResult<bool> {
        let (dx, dy) = viewport.drag_delta_to_world(screen_dx, screen_dy);
        let target = self
            .board
            .lock()
            .unwrap()
            .get(id)
            .map(|note| (note.x + dx, note.y + dy));
        let Some((x, y)) = target else {
            return Ok(false);
        };
        self.move_note(id, x, y).await
    }

    /// Resize a note; the requested size is clamped to the resize bounds.
    pub async fn resize_note(&self, id: Uuid, width: f64, height: f64) -> BoardResult<bool> {
        let (width, height) = validation::clamp_note_size(width, height);
        self.update_flow(id, NotePatch::size(width, height)).await
    }

    /// Replace a note's text. No-op when unchanged or on a document note.
    pub async fn edit_text(&self, id: Uuid, text: &str) -> BoardResult<bool> {
        validation::validate_note_text(text)?;
        let state = self
            .board
            .lock()
            .unwrap()
            .get(id)
            .map(|note| (note.text == text, note.is_document()));
        match state {
            Some((false, false)) => self.update_flow(id, NotePatch::text(text)).await,
            _ => Ok(false),
        }
    }

    /// Flip a note's read flag.
    pub async fn toggle_read(&self, id: Uuid) -> BoardResult<bool> {
        let Some(is_read) = self.board.lock().unwrap().get(id).map(|note| note.is_read) else {
            return Ok(false);
        };
        self.update_flow(id, NotePatch::read(!is_read)).await
    }

    /// Append a reply to a note.
    ///
    /// Replies are an embedded column, so the append rewrites the whole
    /// array built from the current local list.
    pub async fn add_reply(
        &self,
        note_id: Uuid,
        text: &str,
        icon: Option<String>,
    ) -> BoardResult<Option<Reply>> {
        validation::validate_reply_text(text)?;
        let Some(mut replies) = self
            .board
            .lock()
            .unwrap()
            .get(note_id)
            .map(|note| note.replies.clone())
        else {
            return Ok(None);
        };

        let reply = Reply::new(note_id, text, icon);
        replies.push(reply.clone());
        self.update_flow(note_id, NotePatch::replies(replies)).await?;
        Ok(Some(reply))
    }

    /// Replace the text of one reply, keeping its position in the list.
    pub async fn update_reply(
        &self,
        note_id: Uuid,
        reply_id: Uuid,
        text: &str,
    ) -> BoardResult<bool> {
        validation::validate_reply_text(text)?;
        let Some(mut replies) = self
            .board
            .lock()
            .unwrap()
            .get(note_id)
            .map(|note| note.replies.clone())
        else {
            return Ok(false);
        };

        let Some(entry) = replies.iter_mut().find(|reply| reply.id == reply_id) else {
            return Ok(false);
        };
        if entry.text == text {
            return Ok(false);
        }
        entry.text = text.to_string();
        self.update_flow(note_id, NotePatch::replies(replies)).await
    }

    /// Clone a note as a fresh row: offset position, unlocked, text suffixed
    /// with " (copy)".
    pub async fn duplicate(&self, id: Uuid) -> BoardResult<Option<Note>> {
        let Some(copy) = self.board.lock().unwrap().get(id).map(Note::duplicate) else {
            return Ok(None);
        };
        self.insert_flow(copy).await.map(Some)
    }

    /// Raise a note above everything else.
    ///
    /// The z-order value is the current millisecond timestamp; wall-clock
    /// time is strictly increasing between user interactions, so the most
    /// recently raised note always wins.
    pub async fn bring_to_front(&self, id: Uuid) -> BoardResult<bool> {
        self.update_flow(id, NotePatch::z_index(Utc::now().timestamp_millis()))
            .await
    }

    /// Lock or unlock a note against dragging.
    pub async fn set_locked(&self, id: Uuid, locked: bool) -> BoardResult<bool> {
        let patch = NotePatch {
            is_locked: Some(locked),
            ..NotePatch::default()
        };
        self.update_flow(id, patch).await
    }

    /// Address a note to an agenda topic.
    pub async fn set_agenda(&self, id: Uuid, agenda_id: &str) -> BoardResult<bool> {
        self.update_flow(id, NotePatch::agenda(agenda_id)).await
    }

    /// Delete a note.
    pub async fn delete(&self, id: Uuid) -> BoardResult<bool> {
        if !self.board.lock().unwrap().apply_local_delete(id) {
            return Ok(false);
        }
        match self.store.delete_note(id).await {
            Ok(_) => {
                self.board.lock().unwrap().confirm(id);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(
                    "Delete failed for note {}: {}",
                    &id.simple().to_string()[..UUID_SHORT_LEN],
                    err
                );
                self.board.lock().unwrap().revert(id);
                Err(err)
            }
        }
    }

    /// Delete every note on the board.
    ///
    /// Irreversible; callers are expected to get explicit user confirmation
    /// before invoking this. Returns the number of rows the store removed.
    pub async fn delete_all(&self) -> BoardResult<u64> {
        let ids: Vec<Uuid> = {
            let mut board = self.board.lock().unwrap();
            let ids: Vec<Uuid> = board
                .notes()
                .iter()
                .map(|note| note.id)
                .filter(|id| *id != DELETE_SENTINEL)
                .collect();
            for id in &ids {
                board.apply_local_delete(*id);
            }
            ids
        };

        match self.store.delete_all_notes().await {
            Ok(count) => {
                let mut board = self.board.lock().unwrap();
                for id in &ids {
                    board.confirm(*id);
                }
                Ok(count)
            }
            Err(err) => {
                tracing::warn!("Delete-all failed: {}", err);
                let mut board = self.board.lock().unwrap();
                // Reverse order so each stored index is valid again.
                for id in ids.iter().rev() {
                    board.revert(*id);
                }
                Err(err)
            }
        }
    }
}
