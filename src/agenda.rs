//! Agenda list and shared room state.
//!
//! A board session tracks a meeting agenda next to the notes: which topic is
//! current, and whether a presentation timer is running. A running timer
//! means the room is presenting, which locks agenda switching until the
//! timer is stopped.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BoardError, BoardResult};
use crate::store::AgendaStore;

/// One agenda topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub presenter: String,
    /// Accent color the UI renders the topic with
    pub fg: String,
    /// Wall-clock end of the slot, "HH:MM" zero-padded
    pub end_time: String,
    /// Sort key; the agenda is ordered ascending
    #[serde(default)]
    pub ord: i64,
}

impl AgendaItem {
    /// Parse the slot's "HH:MM" end time.
    pub fn end_time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end_time, "%H:%M").ok()
    }

    /// The end instant on the same day as `now`.
    ///
    /// Wall-clock times are interpreted in UTC; every client of a board and
    /// its server must share this convention.
    pub fn end_instant(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = self.end_time_of_day()?;
        Some(now.date_naive().and_time(time).and_utc())
    }
}

/// The shared room-state row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomState {
    #[serde(default)]
    pub current_agenda_id: Option<String>,
    #[serde(default)]
    pub timer_end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timer_owner_id: Option<String>,
}

impl RoomState {
    /// A running timer means a presentation is live.
    pub fn is_presenting(&self) -> bool {
        self.timer_end_at.is_some()
    }

    /// Merge a partial room update, leaving untouched fields as-is.
    pub fn apply(&mut self, patch: &RoomPatch) {
        if let Some(id) = &patch.current_agenda_id {
            self.current_agenda_id = Some(id.clone());
        }
        if let Some(end_at) = &patch.timer_end_at {
            self.timer_end_at = *end_at;
        }
        if let Some(owner) = &patch.timer_owner_id {
            self.timer_owner_id = owner.clone();
        }
    }
}

/// Partial room-state update.
///
/// Double options distinguish "leave untouched" (outer `None`, omitted from
/// the wire) from "clear the column" (`Some(None)`, serialized as null).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agenda_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_end_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_owner_id: Option<Option<String>>,
}

impl RoomPatch {
    pub fn agenda(id: impl Into<String>) -> Self {
        Self {
            current_agenda_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn timer(end_at: DateTime<Utc>, owner_id: impl Into<String>) -> Self {
        Self {
            timer_end_at: Some(Some(end_at)),
            timer_owner_id: Some(Some(owner_id.into())),
            ..Self::default()
        }
    }

    pub fn timer_cleared() -> Self {
        Self {
            timer_end_at: Some(None),
            timer_owner_id: Some(None),
            ..Self::default()
        }
    }
}

/// Seconds remaining until `target`, floored at zero.
pub fn seconds_left(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_seconds().max(0)
}

#[derive(Debug, Default)]
struct AgendaState {
    items: Vec<AgendaItem>,
    room: RoomState,
}

/// Client-side view of the agenda and room state.
///
/// Room mutations follow the note pattern: apply locally first, then issue
/// the remote update, restoring the prior state when the request fails.
pub struct AgendaClient<S> {
    store: Arc<S>,
    state: Mutex<AgendaState>,
}

impl<S: AgendaStore> AgendaClient<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Mutex::new(AgendaState::default()),
        }
    }

    /// Fetch the agenda list and the room state, replacing the local view.
    pub async fn load(&self) -> BoardResult<usize> {
        let mut items = self.store.fetch_agenda().await?;
        items.sort_by_key(|item| item.ord);
        let room = self.store.fetch_room_state().await?;

        let mut state = self.state.lock().unwrap();
        state.items = items;
        state.room = room;
        Ok(state.items.len())
    }

    pub fn items(&self) -> Vec<AgendaItem> {
        self.state.lock().unwrap().items.clone()
    }

    pub fn room(&self) -> RoomState {
        self.state.lock().unwrap().room.clone()
    }

    pub fn is_presenting(&self) -> bool {
        self.state.lock().unwrap().room.is_presenting()
    }

    /// The current topic: the one the room points at, else the first.
    pub fn current(&self) -> Option<AgendaItem> {
        let state = self.state.lock().unwrap();
        Self::current_index(&state)
            .map(|idx| state.items[idx].clone())
            .or_else(|| state.items.first().cloned())
    }

    fn current_index(state: &AgendaState) -> Option<usize> {
        let current_id = state.room.current_agenda_id.as_deref()?;
        state.items.iter().position(|item| item.id == current_id)
    }

    /// Switch to another topic. Refused (returns false) while presenting.
    pub async fn switch_to(&self, id: &str) -> BoardResult<bool> {
        let prior = {
            let mut state = self.state.lock().unwrap();
            if state.room.is_presenting() {
                return Ok(false);
            }
            if !state.items.iter().any(|item| item.id == id) {
                return Err(BoardError::NotFound(format!("agenda item {}", id)));
            }
            let prior = state.room.clone();
            state.room.current_agenda_id = Some(id.to_string());
            prior
        };

        match self.store.update_room_state(&RoomPatch::agenda(id)).await {
            Ok(_) => Ok(true),
            Err(err) => {
                self.state.lock().unwrap().room = prior;
                Err(err)
            }
        }
    }

    /// Advance to the next topic, if any.
    pub async fn next(&self) -> BoardResult<bool> {
        let Some(id) = self.neighbor(1) else {
            return Ok(false);
        };
        self.switch_to(&id).await
    }

    /// Go back to the previous topic, if any.
    pub async fn prev(&self) -> BoardResult<bool> {
        let Some(id) = self.neighbor(-1) else {
            return Ok(false);
        };
        self.switch_to(&id).await
    }

    fn neighbor(&self, offset: i64) -> Option<String> {
        let state = self.state.lock().unwrap();
        let idx = Self::current_index(&state).unwrap_or(0) as i64 + offset;
        if idx < 0 {
            return None;
        }
        state.items.get(idx as usize).map(|item| item.id.clone())
    }

    /// Start the presentation timer for the current topic.
    ///
    /// The end instant comes from the topic's scheduled "HH:MM" end time on
    /// the current day.
    pub async fn start_timer(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> BoardResult<DateTime<Utc>> {
        let item = self
            .current()
            .ok_or_else(|| BoardError::NotFound("no agenda items".to_string()))?;
        let end_at = item.end_instant(now).ok_or_else(|| {
            BoardError::validation("end_time", format!("not a valid HH:MM: {:?}", item.end_time))
        })?;

        let prior = {
            let mut state = self.state.lock().unwrap();
            let prior = state.room.clone();
            state.room.timer_end_at = Some(end_at);
            state.room.timer_owner_id = Some(owner_id.to_string());
            prior
        };

        match self
            .store
            .update_room_state(&RoomPatch::timer(end_at, owner_id))
            .await
        {
            Ok(_) => Ok(end_at),
            Err(err) => {
                self.state.lock().unwrap().room = prior;
                Err(err)
            }
        }
    }

    /// Stop the presentation timer, unlocking agenda switching.
    pub async fn stop_timer(&self) -> BoardResult<()> {
        let prior = {
            let mut state = self.state.lock().unwrap();
            let prior = state.room.clone();
            state.room.timer_end_at = None;
            state.room.timer_owner_id = None;
            prior
        };

        match self.store.update_room_state(&RoomPatch::timer_cleared()).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.state.lock().unwrap().room = prior;
                Err(err)
            }
        }
    }

    /// Seconds remaining: against the running timer if one is live, else
    /// against the current topic's scheduled end.
    pub fn time_left(&self, now: DateTime<Utc>) -> i64 {
        let room = self.room();
        if let Some(end_at) = room.timer_end_at {
            return seconds_left(end_at, now);
        }
        self.current()
            .and_then(|item| item.end_instant(now))
            .map(|end_at| seconds_left(end_at, now))
            .unwrap_or(0)
    }

    /// Replace the room state from a remote change notification.
    pub fn apply_room_update(&self, room: RoomState) {
        self.state.lock().unwrap().room = room;
    }

    /// Replace the agenda list from a remote refresh.
    pub fn apply_agenda_refresh(&self, mut items: Vec<AgendaItem>) {
        items.sort_by_key(|item| item.ord);
        self.state.lock().unwrap().items = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::MemoryStore;
    use chrono::TimeZone;

    fn item(id: &str, end_time: &str, ord: i64) -> AgendaItem {
        AgendaItem {
            id: id.to_string(),
            presenter: format!("presenter-{}", id),
            fg: "#336699".to_string(),
            end_time: end_time.to_string(),
            ord,
        }
    }

    fn client_with_agenda() -> AgendaClient<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed_agenda(vec![item("b", "15:00", 2), item("a", "14:30", 1)]);
        AgendaClient::new(store)
    }

    #[test]
    fn test_end_instant() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let slot = item("a", "14:30", 1);

        let end = slot.end_instant(now).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_end_instant_rejects_garbage() {
        let now = Utc::now();
        assert!(item("a", "25:99", 1).end_instant(now).is_none());
        assert!(item("a", "soon", 1).end_instant(now).is_none());
    }

    #[test]
    fn test_seconds_left_floors_at_zero() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 30).unwrap();

        assert_eq!(seconds_left(past, now), 0);
        assert_eq!(seconds_left(future, now), 90);
    }

    #[test]
    fn test_room_patch_wire_shape() {
        let value = serde_json::to_value(RoomPatch::timer_cleared()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 2);
        assert!(obj["timer_end_at"].is_null());
        assert!(obj["timer_owner_id"].is_null());

        let value = serde_json::to_value(RoomPatch::agenda("a")).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_sorts_by_ord() {
        let client = client_with_agenda();
        assert_eq!(client.load().await.unwrap(), 2);

        let items = client.items();
        assert_eq!(items[0].id, "a");
        assert_eq!(items[1].id, "b");
    }

    #[tokio::test]
    async fn test_switch_and_navigation() {
        let client = client_with_agenda();
        client.load().await.unwrap();

        assert_eq!(client.current().unwrap().id, "a");
        assert!(client.next().await.unwrap());
        assert_eq!(client.current().unwrap().id, "b");
        assert!(!client.next().await.unwrap());
        assert!(client.prev().await.unwrap());
        assert_eq!(client.current().unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_switch_refused_while_presenting() {
        let client = client_with_agenda();
        client.load().await.unwrap();

        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        client.start_timer("me", now).await.unwrap();
        assert!(client.is_presenting());

        assert!(!client.switch_to("b").await.unwrap());

        client.stop_timer().await.unwrap();
        assert!(!client.is_presenting());
        assert!(client.switch_to("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_timer_drives_time_left() {
        let client = client_with_agenda();
        client.load().await.unwrap();

        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        client.start_timer("me", now).await.unwrap();

        // Current topic "a" ends 14:30
        assert_eq!(client.time_left(now), 30 * 60);
    }
}
