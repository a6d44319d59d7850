//! Abstract file storage for board uploads.
//!
//! Icons and document pages are uploaded once and referenced from notes by
//! their publicly retrievable URL. The trait keeps upload logic independent
//! of where the bytes actually land.
//!
//! Folder layout mirrors the shared bucket: `icons/` for note icons,
//! `pdfs/` for uploaded documents.

use std::future::Future;
use std::path::Path;

use uuid::Uuid;

use crate::error::BoardResult;
use crate::validation::{validate_file_name, validate_folder_name};

/// Folder for note icons.
pub const ICONS_FOLDER: &str = "icons";

/// Folder for uploaded documents.
pub const PAGES_FOLDER: &str = "pdfs";

/// Maximum folder entries fetched per listing.
pub const LIST_LIMIT: usize = 1000;

/// Trait for file storage implementations.
pub trait FileStore: Send + Sync {
    /// Upload bytes as `folder/name`.
    ///
    /// # Returns
    /// * `Ok(url)` - The publicly retrievable URL of the stored file
    /// * `Err(BoardError)` - If the upload fails
    fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = BoardResult<String>> + Send;

    /// Names of the files under `folder`, at most `limit`.
    fn list(
        &self,
        folder: &str,
        limit: usize,
    ) -> impl Future<Output = BoardResult<Vec<String>>> + Send;

    /// Remove one file. Removing an absent file is not an error.
    fn remove(&self, folder: &str, name: &str)
        -> impl Future<Output = BoardResult<()>> + Send;
}

/// Upload under a random name, keeping the original file's extension so the
/// served URL stays recognizable to viewers.
pub async fn upload_with_random_name<S: FileStore>(
    store: &S,
    folder: &str,
    original_name: &str,
    bytes: Vec<u8>,
) -> BoardResult<String> {
    validate_folder_name(folder)?;

    let stem = Uuid::now_v7().simple().to_string();
    let name = match Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => format!("{}.{}", stem, ext.to_lowercase()),
        None => stem,
    };
    validate_file_name(&name)?;

    store.upload(folder, &name, bytes).await
}

/// Remove everything under a folder; returns how many files went away.
///
/// Failures are logged and swallowed: a board reset proceeds even when
/// storage cleanup cannot.
pub async fn wipe_folder<S: FileStore>(store: &S, folder: &str) -> usize {
    let names = match store.list(folder, LIST_LIMIT).await {
        Ok(names) => names,
        Err(err) => {
            tracing::warn!("Could not list folder {}: {}", folder, err);
            return 0;
        }
    };

    let mut removed = 0;
    for name in names {
        match store.remove(folder, &name).await {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!("Could not remove {}/{}: {}", folder, name, err);
            }
        }
    }
    removed
}

/// Remove every uploaded icon and document (part of a full board reset).
pub async fn wipe_all_uploads<S: FileStore>(store: &S) -> usize {
    wipe_folder(store, ICONS_FOLDER).await + wipe_folder(store, PAGES_FOLDER).await
}
