use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;

/// Lifecycle of a help request: opened by the victim, taken by a helper,
/// closed when help is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HelpStatus {
    Open,
    Taken,
    Closed,
}

/// One duress help request and the streaming session minted for it.
#[derive(Debug, Clone, Serialize)]
pub struct HelpRecord {
    pub name: String,
    pub zone: String,
    pub mobile: String,
    pub status: HelpStatus,
    pub room_id: String,
    pub stream_id: String,
}

#[derive(Default)]
struct HelpState {
    requests: Vec<HelpRecord>,
    acknowledgements: HashMap<String, String>,
}

/// In-process record store for the help workflow. Holds no media state;
/// its outputs are room identifiers that the room registry and the
/// WebSocket handlers consume.
pub struct HelpDesk {
    inner: RwLock<HelpState>,
}

impl HelpDesk {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HelpState::default()),
        }
    }

    /// Record a new open help request bound to a freshly minted room.
    pub async fn open_request(
        &self,
        name: &str,
        zone: &str,
        mobile: &str,
        room_id: &str,
        stream_id: &str,
    ) -> HelpRecord {
        let record = HelpRecord {
            name: name.to_string(),
            zone: zone.to_string(),
            mobile: mobile.to_string(),
            status: HelpStatus::Open,
            room_id: room_id.to_string(),
            stream_id: stream_id.to_string(),
        };
        let mut state = self.inner.write().await;
        state.requests.push(record.clone());
        record
    }

    /// The most recently opened request still waiting for a helper.
    pub async fn latest_open(&self) -> Option<HelpRecord> {
        let state = self.inner.read().await;
        state
            .requests
            .iter()
            .rev()
            .find(|r| r.status == HelpStatus::Open)
            .cloned()
    }

    /// A helper takes the named request. Returns false if no request with
    /// that name exists.
    pub async fn acknowledge(&self, name: &str, helper: &str) -> bool {
        let mut state = self.inner.write().await;
        state
            .acknowledgements
            .insert(name.to_string(), helper.to_string());
        let Some(request) = state.requests.iter_mut().rev().find(|r| r.name == name) else {
            return false;
        };
        request.status = HelpStatus::Taken;
        true
    }

    /// The helper assigned to the named request, with its current status.
    pub async fn helper_for(&self, name: &str) -> Option<(String, HelpStatus)> {
        let state = self.inner.read().await;
        let helper = state.acknowledgements.get(name)?.clone();
        let status = state
            .requests
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map(|r| r.status)
            // Request record missing but an acknowledgement exists: report
            // open rather than inventing a terminal state.
            .unwrap_or(HelpStatus::Open);
        Some((helper, status))
    }

    /// Mark the named request closed and release its helper assignment.
    /// The streaming room is left untouched; peers disconnect on their own.
    pub async fn complete(&self, name: &str) -> bool {
        let mut state = self.inner.write().await;
        state.acknowledgements.remove(name);
        let Some(request) = state.requests.iter_mut().rev().find(|r| r.name == name) else {
            return false;
        };
        request.status = HelpStatus::Closed;
        true
    }

    /// The latest session minted for the named requester, any status.
    pub async fn session_for(&self, name: &str) -> Option<HelpRecord> {
        let state = self.inner.read().await;
        state.requests.iter().rev().find(|r| r.name == name).cloned()
    }
}

impl Default for HelpDesk {
    fn default() -> Self {
        Self::new()
    }
}
