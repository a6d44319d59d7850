//! Board server implementation using Axum.
//!
//! This module provides the server side of the board protocol:
//! - /board/status - Health check and change-log tail position
//! - /board/notes - Row CRUD for the notes table
//! - /board/changes - Sequenced change-log tail for feed pollers
//! - /board/agenda, /board/room - Agenda list and shared room state
//! - /files/{folder}/{name} - Upload storage backing note icons and documents
//!
//! State lives in a [`MemoryStore`]; every mutation lands in its change log,
//! which is what connected clients poll to stay live.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::agenda::RoomPatch;
use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::models::{Note, NotePatch, DELETE_SENTINEL};
use crate::store::{AgendaStore, RemoteStore, SequencedChange};
use crate::store_memory::MemoryStore;
use crate::validation::{validate_file_name, validate_folder_name};
use crate::UUID_SHORT_LEN;

const PROTOCOL_VERSION: &str = "1.0";

/// Server shutdown handle
static SHUTDOWN_TX: OnceLock<Mutex<Option<oneshot::Sender<()>>>> = OnceLock::new();

/// Shared server state
#[derive(Clone)]
struct AppState {
    store: Arc<MemoryStore>,
    server_name: String,
    public_url: String,
    files_dir: Option<PathBuf>,
}

// Request/Response types

#[derive(Debug, Serialize)]
struct StatusResponse {
    server_name: String,
    status: String,
    protocol_version: String,
    last_seq: u64,
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    after: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChangesResponse {
    changes: Vec<SequencedChange>,
    last_seq: u64,
}

#[derive(Debug, Deserialize)]
struct DeleteAllQuery {
    except: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    deleted: u64,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// Route handlers

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        server_name: state.server_name.clone(),
        status: "ok".to_string(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        last_seq: state.store.last_seq(),
    })
}

async fn list_notes(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.fetch_notes().await {
        Ok(notes) => Json(notes).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Insert one row (object body) or a batch (array body).
async fn insert_notes(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    if body.is_array() {
        let notes: Vec<Note> = match serde_json::from_value(body) {
            Ok(notes) => notes,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Malformed rows: {}", e))
            }
        };
        tracing::debug!("POST /board/notes ({} rows)", notes.len());
        match state.store.insert_notes(&notes).await {
            Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
            Err(BoardError::Remote(msg)) => error_response(StatusCode::CONFLICT, msg),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    } else {
        let note: Note = match serde_json::from_value(body) {
            Ok(note) => note,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Malformed row: {}", e))
            }
        };
        tracing::debug!("POST /board/notes id={}", &note.id_hex()[..UUID_SHORT_LEN]);
        match state.store.insert_note(&note).await {
            Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
            Err(BoardError::Remote(msg)) => error_response(StatusCode::CONFLICT, msg),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NotePatch>,
) -> impl IntoResponse {
    tracing::debug!(
        "PATCH /board/notes/{}",
        &id.simple().to_string()[..UUID_SHORT_LEN]
    );
    match state.store.update_note(id, &body).await {
        Ok(Some(note)) => Json(note).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("No note with id {}", id)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    tracing::debug!(
        "DELETE /board/notes/{}",
        &id.simple().to_string()[..UUID_SHORT_LEN]
    );
    match state.store.delete_note(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("No note with id {}", id)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Bulk delete. The only supported filter is "everything except the
/// reserved all-zero sentinel", which is also the default.
async fn delete_all_notes(
    State(state): State<AppState>,
    Query(query): Query<DeleteAllQuery>,
) -> impl IntoResponse {
    if let Some(except) = query.except {
        if except != DELETE_SENTINEL {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Only the all-zero sentinel may be excluded from a bulk delete",
            );
        }
    }
    tracing::debug!("DELETE /board/notes (bulk)");
    match state.store.delete_all_notes().await {
        Ok(deleted) => Json(DeletedResponse { deleted }).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> impl IntoResponse {
    let after = query.after.unwrap_or(0);
    let limit = query.limit.unwrap_or(1000).min(10_000);
    tracing::trace!("GET /board/changes after={} limit={}", after, limit);

    let (changes, last_seq) = state.store.changes_after(after, limit);
    Json(ChangesResponse { changes, last_seq })
}

async fn get_agenda(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.fetch_agenda().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_room(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.fetch_room_state().await {
        Ok(room) => Json(room).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn patch_room(
    State(state): State<AppState>,
    Json(body): Json<RoomPatch>,
) -> impl IntoResponse {
    tracing::debug!("PATCH /board/room");
    match state.store.update_room_state(&body).await {
        Ok(room) => Json(room).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// File storage handlers

fn resolve_file_path(
    state: &AppState,
    folder: &str,
    name: &str,
) -> Result<PathBuf, axum::response::Response> {
    if let Err(e) = validate_folder_name(folder) {
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }
    if let Err(e) = validate_file_name(name) {
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }
    let Some(files_dir) = &state.files_dir else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "files_dir not configured",
        ));
    };
    Ok(files_dir.join(folder).join(name))
}

async fn upload_file(
    State(state): State<AppState>,
    Path((folder, name)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    tracing::debug!("POST /files/{}/{} ({} bytes)", folder, name, body.len());

    let path = match resolve_file_path(&state, &folder, &name) {
        Ok(path) => path,
        Err(response) => return response,
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }
    if let Err(e) = std::fs::write(&path, &body) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let url = format!(
        "{}/files/{}/{}",
        state.public_url,
        urlencoding::encode(&folder),
        urlencoding::encode(&name)
    );
    (StatusCode::CREATED, Json(UploadResponse { url })).into_response()
}

async fn download_file(
    State(state): State<AppState>,
    Path((folder, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let path = match resolve_file_path(&state, &folder, &name) {
        Ok(path) => path,
        Err(response) => return response,
    };

    match std::fs::read(&path) {
        Ok(contents) => (StatusCode::OK, contents).into_response(),
        Err(_) => error_response(
            StatusCode::NOT_FOUND,
            format!("No file {}/{}", folder, name),
        ),
    }
}

async fn list_files(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    if let Err(e) = validate_folder_name(&folder) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    let Some(files_dir) = &state.files_dir else {
        return error_response(StatusCode::NOT_FOUND, "files_dir not configured");
    };

    let limit = query.limit.unwrap_or(1000).min(10_000);
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(files_dir.join(&folder)) {
        for entry in entries.flatten() {
            if files.len() >= limit {
                break;
            }
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.file_name().to_string_lossy().to_string());
            }
        }
    }
    files.sort();
    Json(ListResponse { files }).into_response()
}

async fn delete_file(
    State(state): State<AppState>,
    Path((folder, name)): Path<(String, String)>,
) -> impl IntoResponse {
    tracing::debug!("DELETE /files/{}/{}", folder, name);

    let path = match resolve_file_path(&state, &folder, &name) {
        Ok(path) => path,
        Err(response) => return response,
    };

    match std::fs::remove_file(&path) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => error_response(
            StatusCode::NOT_FOUND,
            format!("No file {}/{}", folder, name),
        ),
    }
}

/// Create the board server router
pub fn create_router(store: Arc<MemoryStore>, config: &Config) -> Router {
    let state = AppState {
        store,
        server_name: config.client_name().to_string(),
        public_url: config.public_url(),
        files_dir: config.files_dir().map(PathBuf::from),
    };

    Router::new()
        .route("/board/status", get(status))
        .route(
            "/board/notes",
            get(list_notes).post(insert_notes).delete(delete_all_notes),
        )
        .route(
            "/board/notes/:id",
            patch(update_note).delete(delete_note),
        )
        .route("/board/changes", get(get_changes))
        .route("/board/agenda", get(get_agenda))
        .route("/board/room", get(get_room).patch(patch_room))
        .route("/files/:folder", get(list_files))
        .route(
            "/files/:folder/:name",
            get(download_file).post(upload_file).delete(delete_file),
        )
        .with_state(state)
}

/// Start the board server
pub async fn start_server(store: Arc<MemoryStore>, config: &Config) -> BoardResult<()> {
    let router = create_router(store, config);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server_port()));

    // Create shutdown channel
    let (tx, rx) = oneshot::channel::<()>();
    SHUTDOWN_TX.get_or_init(|| Mutex::new(Some(tx)));

    tracing::info!("Starting board server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| BoardError::network(e.to_string()))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            rx.await.ok();
        })
        .await
        .map_err(|e| BoardError::network(e.to_string()))?;

    Ok(())
}

/// Stop the board server
pub fn stop_server() {
    if let Some(mutex) = SHUTDOWN_TX.get() {
        if let Ok(mut guard) = mutex.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agenda::AgendaItem;
    use crate::client::BoardClient;
    use crate::models::NoteColor;
    use crate::store_http::HttpStore;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Bind an ephemeral port, wire the config at that address, and serve.
    async fn running_board(temp_dir: &TempDir) -> (Arc<MemoryStore>, Config) {
        let mut config = Config::new(temp_dir.path()).unwrap();
        config
            .set_files_dir(&temp_dir.path().join("files").to_string_lossy())
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        store.seed_agenda(vec![AgendaItem {
            id: "topic-1".to_string(),
            presenter: "Avery".to_string(),
            fg: "#aa3355".to_string(),
            end_time: "14:30".to_string(),
            ord: 1,
        }]);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        config.set_store_url(&base_url).unwrap();
        config.set("public_url", &base_url).unwrap();

        let router = create_router(store.clone(), &config);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (store, config)
    }

    #[tokio::test]
    async fn test_note_crud_over_http() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, config) = running_board(&temp_dir).await;

        let http = Arc::new(HttpStore::connect(&config).unwrap());
        let client = BoardClient::new(http.clone());

        let note = client
            .add_note("over http", NoteColor::Red, Some((50.0, 150.0)), None, None)
            .await
            .unwrap();

        // A second client loads the same row back.
        let other = BoardClient::new(Arc::new(HttpStore::connect(&config).unwrap()));
        other.load().await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other.note(note.id).unwrap().text, "over http");

        // Patch and delete round-trip.
        assert!(client.edit_text(note.id, "edited").await.unwrap());
        let updated = http
            .update_note(note.id, &NotePatch::read(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.text, "edited");
        assert!(updated.is_read);

        assert!(client.delete(note.id).await.unwrap());
        assert!(!http.delete_note(note.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_change_feed_reaches_other_client() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, config) = running_board(&temp_dir).await;

        let writer = BoardClient::new(Arc::new(HttpStore::connect(&config).unwrap()));

        let reader_store = Arc::new(HttpStore::connect(&config).unwrap());
        let reader = BoardClient::new(reader_store.clone());
        reader.load().await.unwrap();
        let mut feed = reader.subscribe();
        let feed_task = reader_store.spawn_feed().await;

        let note = writer
            .add_note("live", NoteColor::Blue, None, None, None)
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), feed.recv())
            .await
            .expect("no change event within timeout")
            .unwrap();
        assert_eq!(event.note.id, note.id);

        reader.apply_event(&event);
        assert_eq!(reader.len(), 1);

        feed_task.abort();
    }

    #[tokio::test]
    async fn test_bulk_delete_requires_sentinel_filter() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, config) = running_board(&temp_dir).await;

        let url = format!(
            "{}/board/notes?except={}",
            config.store_url().unwrap(),
            Uuid::now_v7()
        );
        let response = reqwest::Client::new().delete(url).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        use crate::file_storage::FileStore;
        use crate::file_storage_http::HttpFileStore;

        let temp_dir = TempDir::new().unwrap();
        let (_store, config) = running_board(&temp_dir).await;

        let files = HttpFileStore::connect(&config).unwrap();
        let url = files
            .upload("icons", "avatar.png", vec![1, 2, 3])
            .await
            .unwrap();

        let served = reqwest::get(&url).await.unwrap();
        assert!(served.status().is_success());
        assert_eq!(served.bytes().await.unwrap().as_ref(), &[1, 2, 3]);

        assert_eq!(files.list("icons", 100).await.unwrap(), vec!["avatar.png"]);
        files.remove("icons", "avatar.png").await.unwrap();
        assert!(files.list("icons", 100).await.unwrap().is_empty());

        // Path traversal is rejected at the validation boundary.
        let bad = reqwest::Client::new()
            .post(format!(
                "{}/files/icons/..%2Fconfig.json",
                config.store_url().unwrap()
            ))
            .body(vec![0u8])
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_agenda_and_room_over_http() {
        use crate::agenda::AgendaClient;

        let temp_dir = TempDir::new().unwrap();
        let (_store, config) = running_board(&temp_dir).await;

        let agenda = AgendaClient::new(Arc::new(HttpStore::connect(&config).unwrap()));
        assert_eq!(agenda.load().await.unwrap(), 1);
        assert_eq!(agenda.current().unwrap().id, "topic-1");

        let now = chrono::Utc::now();
        agenda.start_timer("me", now).await.unwrap();
        assert!(agenda.is_presenting());

        // A second client observes the running timer.
        let other = AgendaClient::new(Arc::new(HttpStore::connect(&config).unwrap()));
        other.load().await.unwrap();
        assert!(other.is_presenting());

        agenda.stop_timer().await.unwrap();
        let other = AgendaClient::new(Arc::new(HttpStore::connect(&config).unwrap()));
        other.load().await.unwrap();
        assert!(!other.is_presenting());
    }
}
