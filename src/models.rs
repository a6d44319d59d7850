//! Data models for Board.
//!
//! This module defines the core entities: Note and Reply, plus the partial
//! field set used for updates. Field names serialize to the exact column
//! names of the shared notes table, including the camelCase `isRead` column
//! and the camelCase keys inside the embedded replies array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default position for a note dropped without coordinates (world space).
pub const DEFAULT_NOTE_X: f64 = 50.0;
pub const DEFAULT_NOTE_Y: f64 = 150.0;

/// Default note size.
pub const DEFAULT_NOTE_WIDTH: f64 = 200.0;
pub const DEFAULT_NOTE_HEIGHT: f64 = 100.0;

/// Resize bounds.
pub const NOTE_MIN_WIDTH: f64 = 100.0;
pub const NOTE_MIN_HEIGHT: f64 = 50.0;
pub const NOTE_MAX_WIDTH: f64 = 800.0;
pub const NOTE_MAX_HEIGHT: f64 = 600.0;

/// Offset applied to both axes when duplicating a note.
pub const DUPLICATE_OFFSET: f64 = 20.0;

/// Suffix appended to a duplicated note's text.
pub const DUPLICATE_SUFFIX: &str = " (copy)";

/// Size of a document-page note.
pub const PAGE_NOTE_WIDTH: f64 = 1600.0;
pub const PAGE_NOTE_HEIGHT: f64 = 2250.0;

/// Gaps between document pages laid out in a grid.
pub const PAGE_GAP_X: f64 = 100.0;
pub const PAGE_GAP_Y: f64 = 100.0;

/// Vertical margin between the existing content and a newly placed document.
pub const PAGE_FILE_MARGIN: f64 = PAGE_NOTE_HEIGHT * 2.0;

/// Pages per row when laying out a whole document.
pub const PAGE_GRID_COLS: u32 = 5;

/// Reserved all-zero identity, excluded from bulk deletes.
pub const DELETE_SENTINEL: Uuid = Uuid::nil();

/// Color/category tag of a note.
///
/// Wire codes match the shared table: `"r"` marks a comment, `"b"` a
/// question, `"white"` a document. Codes written by other clients that this
/// build does not know are preserved as [`NoteColor::Other`] so they survive
/// a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NoteColor {
    #[default]
    Red,
    Blue,
    White,
    Other(String),
}

impl NoteColor {
    pub fn from_code(code: &str) -> Self {
        match code {
            "r" => NoteColor::Red,
            "b" => NoteColor::Blue,
            "white" => NoteColor::White,
            other => NoteColor::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            NoteColor::Red => "r",
            NoteColor::Blue => "b",
            NoteColor::White => "white",
            NoteColor::Other(code) => code,
        }
    }
}

impl Serialize for NoteColor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for NoteColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Ok(NoteColor::from_code(&code))
    }
}

/// Kind of a note: a plain text note or one page of an uploaded document.
///
/// Document notes ignore text-editing operations and are never draggable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteKind {
    #[default]
    #[serde(rename = "note")]
    Text,
    #[serde(rename = "pdf")]
    Document,
}

/// A reply attached to a note.
///
/// Replies live inside their owning note's embedded array; they have no
/// independent lifecycle. Wire keys are camelCase to match the stored JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    /// Back-reference to the owning note (not ownership).
    pub note_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Reply {
    /// Create a new reply for the given note
    pub fn new(note_id: Uuid, text: impl Into<String>, icon: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            note_id,
            text: text.into(),
            icon,
            created_at: Utc::now(),
        }
    }
}

/// A sticky note on the board.
///
/// Serialization matches the shared table row layout exactly:
/// `notes(id, text, x, y, width, height, color, icon, isRead, replies, type,
/// file_url, page_index, is_locked, z_index, agenda_id, created_at)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier (UUID7, client-generated before the insert)
    pub id: Uuid,
    #[serde(default)]
    pub text: String,
    /// Position in world coordinates
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_note_width")]
    pub width: f64,
    #[serde(default = "default_note_height")]
    pub height: f64,
    #[serde(default)]
    pub color: NoteColor,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(rename = "isRead", default)]
    pub is_read: bool,
    /// Insertion-ordered; replies are appended, never reordered
    #[serde(default)]
    pub replies: Vec<Reply>,
    #[serde(rename = "type", default)]
    pub kind: NoteKind,
    /// Source document URL, document notes only
    #[serde(default)]
    pub file_url: Option<String>,
    /// 1-based page index within the source document
    #[serde(default)]
    pub page_index: Option<u32>,
    /// A locked note cannot be dragged
    #[serde(default)]
    pub is_locked: bool,
    /// Millisecond timestamp of the last bring-to-front interaction
    #[serde(default)]
    pub z_index: i64,
    /// Agenda topic this note is addressed to, if any
    #[serde(default)]
    pub agenda_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_note_width() -> f64 {
    DEFAULT_NOTE_WIDTH
}

fn default_note_height() -> f64 {
    DEFAULT_NOTE_HEIGHT
}

impl Note {
    /// Create a new text note at the given world position
    pub fn new(text: impl Into<String>, color: NoteColor, x: f64, y: f64) -> Self {
        Self {
            id: Uuid::now_v7(),
            text: text.into(),
            x,
            y,
            width: DEFAULT_NOTE_WIDTH,
            height: DEFAULT_NOTE_HEIGHT,
            color,
            icon: None,
            is_read: false,
            replies: Vec::new(),
            kind: NoteKind::Text,
            file_url: None,
            page_index: None,
            is_locked: false,
            z_index: 0,
            agenda_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a document-page note showing one page of an uploaded file
    pub fn document(file_url: impl Into<String>, page_index: u32, x: f64, y: f64) -> Self {
        Self {
            id: Uuid::now_v7(),
            text: String::new(),
            x,
            y,
            width: PAGE_NOTE_WIDTH,
            height: PAGE_NOTE_HEIGHT,
            color: NoteColor::White,
            icon: None,
            is_read: false,
            replies: Vec::new(),
            kind: NoteKind::Document,
            file_url: Some(file_url.into()),
            page_index: Some(page_index),
            is_locked: false,
            z_index: 0,
            agenda_id: None,
            created_at: Utc::now(),
        }
    }

    /// Get the note ID as a hex string
    pub fn id_hex(&self) -> String {
        self.id.simple().to_string()
    }

    pub fn is_document(&self) -> bool {
        self.kind == NoteKind::Document
    }

    /// Whether a drag gesture may move this note
    pub fn draggable(&self) -> bool {
        !self.is_locked && !self.is_document()
    }

    /// Center of the note in world coordinates
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Bottom edge of the note in world coordinates
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Clone this note as a fresh row: new identity, offset position,
    /// unlocked, text suffixed with " (copy)".
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::now_v7();
        copy.x += DUPLICATE_OFFSET;
        copy.y += DUPLICATE_OFFSET;
        copy.text.push_str(DUPLICATE_SUFFIX);
        copy.is_locked = false;
        copy.created_at = Utc::now();
        copy
    }

    /// Shallow-merge a partial field set into this note, leaving every
    /// untouched field as-is.
    pub fn apply(&mut self, patch: &NotePatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(icon) = &patch.icon {
            self.icon = Some(icon.clone());
        }
        if let Some(is_read) = patch.is_read {
            self.is_read = is_read;
        }
        if let Some(replies) = &patch.replies {
            self.replies = replies.clone();
        }
        if let Some(is_locked) = patch.is_locked {
            self.is_locked = is_locked;
        }
        if let Some(z_index) = patch.z_index {
            self.z_index = z_index;
        }
        if let Some(agenda_id) = &patch.agenda_id {
            self.agenda_id = Some(agenda_id.clone());
        }
    }
}

/// Partial field set for a note update.
///
/// `None` fields are left untouched by [`Note::apply`] and omitted from the
/// serialized update body, so the same value drives both the optimistic
/// local merge and the remote column update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<NoteColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "isRead", skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<Reply>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agenda_id: Option<String>,
}

impl NotePatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn read(is_read: bool) -> Self {
        Self {
            is_read: Some(is_read),
            ..Self::default()
        }
    }

    pub fn replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Some(replies),
            ..Self::default()
        }
    }

    pub fn z_index(z_index: i64) -> Self {
        Self {
            z_index: Some(z_index),
            ..Self::default()
        }
    }

    pub fn agenda(agenda_id: impl Into<String>) -> Self {
        Self {
            agenda_id: Some(agenda_id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_creation_defaults() {
        let note = Note::new("Test content", NoteColor::Red, 50.0, 150.0);

        assert!(!note.id.is_nil());
        assert_eq!(note.text, "Test content");
        assert_eq!(note.width, 200.0);
        assert_eq!(note.height, 100.0);
        assert!(!note.is_read);
        assert!(note.replies.is_empty());
        assert_eq!(note.kind, NoteKind::Text);
        assert!(note.draggable());
    }

    #[test]
    fn test_document_note() {
        let note = Note::document("https://example.com/files/pdfs/deck.pdf", 3, 50.0, 150.0);

        assert!(note.is_document());
        assert!(!note.draggable());
        assert_eq!(note.page_index, Some(3));
        assert_eq!(note.color, NoteColor::White);
        assert_eq!(note.width, PAGE_NOTE_WIDTH);
    }

    #[test]
    fn test_locked_note_not_draggable() {
        let mut note = Note::new("pinned", NoteColor::Blue, 0.0, 0.0);
        note.is_locked = true;
        assert!(!note.draggable());
    }

    #[test]
    fn test_duplicate_offsets_and_unlocks() {
        let mut note = Note::new("original", NoteColor::Blue, 10.0, 20.0);
        note.is_locked = true;

        let copy = note.duplicate();
        assert_ne!(copy.id, note.id);
        assert_eq!(copy.x, 30.0);
        assert_eq!(copy.y, 40.0);
        assert_eq!(copy.text, "original (copy)");
        assert!(!copy.is_locked);
    }

    #[test]
    fn test_color_codes_round_trip() {
        assert_eq!(NoteColor::from_code("r"), NoteColor::Red);
        assert_eq!(NoteColor::from_code("b"), NoteColor::Blue);
        assert_eq!(NoteColor::from_code("white"), NoteColor::White);

        let foreign = NoteColor::from_code("teal");
        assert_eq!(foreign.as_code(), "teal");
    }

    #[test]
    fn test_apply_patch_preserves_untouched_fields() {
        let mut note = Note::new("before", NoteColor::Red, 1.0, 2.0);
        note.replies.push(Reply::new(note.id, "hi", None));
        let snapshot = note.clone();

        note.apply(&NotePatch::text("after"));

        assert_eq!(note.text, "after");
        assert_eq!(note.x, snapshot.x);
        assert_eq!(note.y, snapshot.y);
        assert_eq!(note.width, snapshot.width);
        assert_eq!(note.height, snapshot.height);
        assert_eq!(note.color, snapshot.color);
        assert_eq!(note.replies, snapshot.replies);
        assert_eq!(note.z_index, snapshot.z_index);
    }

    #[test]
    fn test_wire_layout() {
        let mut note = Note::new("hello", NoteColor::Red, 1.0, 2.0);
        note.replies.push(Reply::new(note.id, "hi", None));

        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["color"], "r");
        assert_eq!(value["isRead"], false);
        assert_eq!(value["type"], "note");
        assert!(value["replies"][0].get("noteId").is_some());
        assert!(value["replies"][0].get("createdAt").is_some());
    }

    #[test]
    fn test_row_with_missing_optionals_decodes() {
        let row = serde_json::json!({
            "id": Uuid::now_v7(),
            "text": "bare",
            "x": 5.0,
            "y": 6.0,
            "color": "b",
        });

        let note: Note = serde_json::from_value(row).unwrap();
        assert_eq!(note.width, DEFAULT_NOTE_WIDTH);
        assert_eq!(note.height, DEFAULT_NOTE_HEIGHT);
        assert_eq!(note.kind, NoteKind::Text);
        assert!(note.replies.is_empty());
        assert!(!note.is_read);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = NotePatch::position(80.0, 140.0);
        let value = serde_json::to_value(&patch).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["x"], 80.0);
        assert_eq!(obj["y"], 140.0);
    }

    #[test]
    fn test_read_patch_uses_camel_case_column() {
        let value = serde_json::to_value(NotePatch::read(true)).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 1);
        assert_eq!(value["isRead"], true);
    }
}
