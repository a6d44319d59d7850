//! Input validation for Board.
//!
//! This module provides validation functions for user-supplied note data.
//! All validators return BoardError::Validation on failure.

use crate::error::{BoardError, BoardResult};
use crate::models::{
    DEFAULT_NOTE_HEIGHT, DEFAULT_NOTE_WIDTH, NOTE_MAX_HEIGHT, NOTE_MAX_WIDTH, NOTE_MIN_HEIGHT,
    NOTE_MIN_WIDTH,
};

// Limits
pub const MAX_NOTE_TEXT_LENGTH: usize = 10_000;
pub const MAX_REPLY_TEXT_LENGTH: usize = 2_000;
pub const MAX_FOLDER_NAME_LENGTH: usize = 64;
pub const MAX_FILE_NAME_LENGTH: usize = 128;

/// Validate note text length.
pub fn validate_note_text(text: &str) -> BoardResult<()> {
    if text.len() > MAX_NOTE_TEXT_LENGTH {
        return Err(BoardError::validation(
            "text",
            format!(
                "must be at most {} bytes, got {}",
                MAX_NOTE_TEXT_LENGTH,
                text.len()
            ),
        ));
    }
    Ok(())
}

/// Validate reply text: non-empty and bounded.
pub fn validate_reply_text(text: &str) -> BoardResult<()> {
    if text.trim().is_empty() {
        return Err(BoardError::validation("reply", "must not be empty"));
    }
    if text.len() > MAX_REPLY_TEXT_LENGTH {
        return Err(BoardError::validation(
            "reply",
            format!(
                "must be at most {} bytes, got {}",
                MAX_REPLY_TEXT_LENGTH,
                text.len()
            ),
        ));
    }
    Ok(())
}

/// Validate a world position.
///
/// Stored positions must always be defined, so NaN and infinities are
/// rejected before they can reach the collection or the remote table.
pub fn validate_position(x: f64, y: f64) -> BoardResult<()> {
    if !x.is_finite() {
        return Err(BoardError::validation("x", "must be a finite number"));
    }
    if !y.is_finite() {
        return Err(BoardError::validation("y", "must be a finite number"));
    }
    Ok(())
}

/// Clamp a requested note size to the resize bounds.
///
/// Non-finite requests fall back to the default size rather than erroring:
/// a resize gesture always yields a usable note.
pub fn clamp_note_size(width: f64, height: f64) -> (f64, f64) {
    let width = if width.is_finite() {
        width.clamp(NOTE_MIN_WIDTH, NOTE_MAX_WIDTH)
    } else {
        DEFAULT_NOTE_WIDTH
    };
    let height = if height.is_finite() {
        height.clamp(NOTE_MIN_HEIGHT, NOTE_MAX_HEIGHT)
    } else {
        DEFAULT_NOTE_HEIGHT
    };
    (width, height)
}

/// Validate a storage folder name: a single flat path segment.
pub fn validate_folder_name(folder: &str) -> BoardResult<()> {
    validate_path_segment(folder, "folder", MAX_FOLDER_NAME_LENGTH)
}

/// Validate an uploaded file name: a single flat path segment.
pub fn validate_file_name(name: &str) -> BoardResult<()> {
    validate_path_segment(name, "file_name", MAX_FILE_NAME_LENGTH)
}

fn validate_path_segment(value: &str, field: &str, max_len: usize) -> BoardResult<()> {
    if value.is_empty() {
        return Err(BoardError::validation(field, "must not be empty"));
    }
    if value.len() > max_len {
        return Err(BoardError::validation(
            field,
            format!("must be at most {} bytes, got {}", max_len, value.len()),
        ));
    }
    if value == "." || value == ".." {
        return Err(BoardError::validation(field, "must not be a dot segment"));
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(BoardError::validation(
            field,
            "must not contain path separators",
        ));
    }
    Ok(())
}

/// Validate a client identity: 32 lowercase hex characters (a UUID without
/// hyphens).
pub fn validate_client_id(value: &str) -> BoardResult<()> {
    if value.len() != 32 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BoardError::validation(
            "client_id",
            "must be 32 hex characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_text_bounds() {
        assert!(validate_note_text("").is_ok());
        assert!(validate_note_text(&"x".repeat(MAX_NOTE_TEXT_LENGTH)).is_ok());
        assert!(validate_note_text(&"x".repeat(MAX_NOTE_TEXT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_reply_text_rejects_blank() {
        assert!(validate_reply_text("   ").is_err());
        assert!(validate_reply_text("hi").is_ok());
    }

    #[test]
    fn test_position_rejects_non_finite() {
        assert!(validate_position(0.0, 0.0).is_ok());
        assert!(validate_position(f64::NAN, 0.0).is_err());
        assert!(validate_position(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_size_clamping() {
        assert_eq!(clamp_note_size(10.0, 10.0), (100.0, 50.0));
        assert_eq!(clamp_note_size(5000.0, 5000.0), (800.0, 600.0));
        assert_eq!(clamp_note_size(300.0, 200.0), (300.0, 200.0));
        assert_eq!(clamp_note_size(f64::NAN, 200.0), (200.0, 200.0));
    }

    #[test]
    fn test_path_segments() {
        assert!(validate_folder_name("icons").is_ok());
        assert!(validate_folder_name("ic/ons").is_err());
        assert!(validate_folder_name("..").is_err());
        assert!(validate_file_name("a1b2.png").is_ok());
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn test_client_id_format() {
        assert!(validate_client_id(&"0".repeat(32)).is_ok());
        assert!(validate_client_id("short").is_err());
        assert!(validate_client_id(&"g".repeat(32)).is_err());
    }
}
