//! HTTP store adapter for the board server.
//!
//! Client side of the board protocol:
//! - row CRUD against /board/notes
//! - a polling task tailing /board/changes into a broadcast feed, which is
//!   what `subscribe` hands out
//! - agenda and room-state access under /board/agenda and /board/room
//!
//! The adapter refuses to construct without a configured store URL; nothing
//! can reach the remote table in that state.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agenda::{AgendaItem, RoomPatch, RoomState};
use crate::config::Config;
use crate::error::{BoardError, BoardResult};
use crate::models::{Note, NotePatch, DELETE_SENTINEL};
use crate::store::{
    decode_note_row, decode_note_rows, AgendaStore, ChangeEvent, ChangeKind, RemoteStore,
};

/// Request timeout for every store round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Broadcast capacity of the change feed.
const FEED_CAPACITY: usize = 256;

/// Maximum change-log entries requested per poll.
const POLL_LIMIT: usize = 500;

/// Server status as reported by GET /board/status.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    pub server_name: String,
    pub status: String,
    pub protocol_version: String,
    pub last_seq: u64,
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    changes: Vec<RawChange>,
    #[allow(dead_code)]
    last_seq: u64,
}

/// A change-log entry before its row passes the decode boundary.
#[derive(Debug, Deserialize)]
struct RawChange {
    seq: u64,
    kind: ChangeKind,
    note: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DeletedResponse {
    deleted: u64,
}

/// HTTP implementation of the remote store.
pub struct HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    feed: broadcast::Sender<ChangeEvent>,
}

impl HttpStore {
    /// Create a store adapter from configuration.
    ///
    /// A missing store URL is fatal here: without it no data operation can
    /// proceed, so construction fails instead of deferring the error.
    pub fn connect(config: &Config) -> BoardResult<Self> {
        let base_url = config
            .store_url()
            .ok_or_else(|| {
                BoardError::Config("store_url is not configured; cannot reach the board".into())
            })?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BoardError::network(e.to_string()))?;

        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key().map(String::from),
            poll_interval: Duration::from_millis(config.poll_interval_ms().max(100)),
            feed,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Check the server is reachable and speaking the board protocol.
    pub async fn status(&self) -> BoardResult<ServerStatus> {
        fetch_status(&self.client, &self.base_url, self.api_key.as_deref()).await
    }

    /// Start the polling task that tails the server's change log into the
    /// broadcast feed.
    ///
    /// Call once after construction; every `subscribe` receiver sees the
    /// events the task forwards. The feed starts at the current tail -
    /// existing rows are loaded via `fetch_notes`, not replayed as events -
    /// and the tail position is read before this returns, so changes made
    /// afterwards are never skipped.
    pub async fn spawn_feed(&self) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let feed = self.feed.clone();
        let interval = self.poll_interval;

        let mut after = match fetch_status(&client, &base_url, api_key.as_deref()).await {
            Ok(status) => status.last_seq,
            Err(err) => {
                tracing::warn!("Change feed bootstrap failed: {}", err);
                0
            }
        };

        tokio::spawn(async move {
            loop {
                match fetch_changes(&client, &base_url, api_key.as_deref(), after).await {
                    Ok(response) => {
                        for change in response.changes {
                            after = after.max(change.seq);
                            if let Some(note) = decode_note_row(change.note) {
                                let _ = feed.send(ChangeEvent {
                                    kind: change.kind,
                                    note,
                                });
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!("Change poll failed: {}", err);
                    }
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

async fn fetch_status(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
) -> BoardResult<ServerStatus> {
    let mut request = client.get(format!("{}/board/status", base_url));
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request
        .send()
        .await
        .map_err(|e| BoardError::network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(BoardError::remote(format!(
            "status check failed with status {}",
            response.status()
        )));
    }

    response
        .json::<ServerStatus>()
        .await
        .map_err(|e| BoardError::remote(format!("Failed to parse status response: {}", e)))
}

async fn fetch_changes(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
    after: u64,
) -> BoardResult<ChangesResponse> {
    let url = format!(
        "{}/board/changes?after={}&limit={}",
        base_url, after, POLL_LIMIT
    );
    let mut request = client.get(url);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request
        .send()
        .await
        .map_err(|e| BoardError::network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(BoardError::remote(format!(
            "change poll failed with status {}",
            response.status()
        )));
    }

    response
        .json::<ChangesResponse>()
        .await
        .map_err(|e| BoardError::remote(format!("Failed to parse changes: {}", e)))
}

impl RemoteStore for HttpStore {
    async fn insert_note(&self, note: &Note) -> BoardResult<Note> {
        let response = self
            .authorize(self.client.post(self.url("/board/notes")))
            .json(note)
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "insert failed with status {}",
                response.status()
            )));
        }

        let row: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse insert response: {}", e)))?;
        decode_note_row(row).ok_or_else(|| BoardError::remote("malformed insert response"))
    }

    async fn insert_notes(&self, notes: &[Note]) -> BoardResult<Vec<Note>> {
        let response = self
            .authorize(self.client.post(self.url("/board/notes")))
            .json(&notes)
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "batch insert failed with status {}",
                response.status()
            )));
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse insert response: {}", e)))?;
        Ok(decode_note_rows(rows))
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> BoardResult<Option<Note>> {
        let response = self
            .authorize(
                self.client
                    .patch(self.url(&format!("/board/notes/{}", id))),
            )
            .json(patch)
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "update failed with status {}",
                response.status()
            )));
        }

        let row: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse update response: {}", e)))?;
        Ok(decode_note_row(row))
    }

    async fn delete_note(&self, id: Uuid) -> BoardResult<bool> {
        let response = self
            .authorize(
                self.client
                    .delete(self.url(&format!("/board/notes/{}", id))),
            )
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "delete failed with status {}",
                response.status()
            )));
        }
        Ok(true)
    }

    async fn delete_all_notes(&self) -> BoardResult<u64> {
        let url = format!(
            "{}/board/notes?except={}",
            self.base_url, DELETE_SENTINEL
        );
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "delete-all failed with status {}",
                response.status()
            )));
        }

        let deleted: DeletedResponse = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse delete response: {}", e)))?;
        Ok(deleted.deleted)
    }

    async fn fetch_notes(&self) -> BoardResult<Vec<Note>> {
        let response = self
            .authorize(self.client.get(self.url("/board/notes")))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "fetch failed with status {}",
                response.status()
            )));
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse rows: {}", e)))?;
        Ok(decode_note_rows(rows))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

impl AgendaStore for HttpStore {
    async fn fetch_agenda(&self) -> BoardResult<Vec<AgendaItem>> {
        let response = self
            .authorize(self.client.get(self.url("/board/agenda")))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "agenda fetch failed with status {}",
                response.status()
            )));
        }

        response
            .json::<Vec<AgendaItem>>()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse agenda: {}", e)))
    }

    async fn fetch_room_state(&self) -> BoardResult<RoomState> {
        let response = self
            .authorize(self.client.get(self.url("/board/room")))
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "room fetch failed with status {}",
                response.status()
            )));
        }

        response
            .json::<RoomState>()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse room state: {}", e)))
    }

    async fn update_room_state(&self, patch: &RoomPatch) -> BoardResult<RoomState> {
        let response = self
            .authorize(self.client.patch(self.url("/board/room")))
            .json(patch)
            .send()
            .await
            .map_err(|e| BoardError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BoardError::remote(format!(
                "room update failed with status {}",
                response.status()
            )));
        }

        response
            .json::<RoomState>()
            .await
            .map_err(|e| BoardError::remote(format!("Failed to parse room state: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_connect_requires_store_url() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(temp_dir.path()).unwrap();

        let result = HttpStore::connect(&config);
        assert!(matches!(result, Err(BoardError::Config(_))));
    }

    #[test]
    fn test_connect_trims_trailing_slash() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path()).unwrap();
        config.set_store_url("http://localhost:8460///").unwrap();

        let store = HttpStore::connect(&config).unwrap();
        assert_eq!(store.url("/board/notes"), "http://localhost:8460/board/notes");
    }
}
