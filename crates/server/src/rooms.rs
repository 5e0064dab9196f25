use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::sfu::RoomPeers;

/// Interval between Picture Loss Indication sweeps across all rooms.
const KEYFRAME_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);

/// A named duress session: the peers connected to it and the forwarding
/// tracks they share. Created on first reference and kept for the life of
/// the process.
pub struct Room {
    pub id: String,
    pub stream_id: String,
    pub peers: Arc<RoomPeers>,
}

impl Room {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            stream_id: stream_id(id),
            peers: RoomPeers::new(id),
        })
    }
}

/// Alternate routing key for a room: the lowercase hex SHA-256 of its id.
pub fn stream_id(room_id: &str) -> String {
    let digest = Sha256::digest(room_id.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in digest {
        write!(hex, "{b:02x}").unwrap();
    }
    hex
}

/// Registry of all rooms in the process, addressable by room id or by
/// stream id. Owned by the application state so tests can spin up isolated
/// instances.
pub struct RoomRegistry {
    inner: RwLock<RegistryMaps>,
}

#[derive(Default)]
struct RegistryMaps {
    rooms: HashMap<String, Arc<Room>>,
    streams: HashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryMaps::default()),
        }
    }

    /// Get the room for `room_id`, creating it (and its stream-id alias)
    /// on first reference. Idempotent.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        {
            let maps = self.inner.read().await;
            if let Some(room) = maps.rooms.get(room_id) {
                return Arc::clone(room);
            }
        }

        let mut maps = self.inner.write().await;
        if let Some(room) = maps.rooms.get(room_id) {
            return Arc::clone(room);
        }

        let room = Room::new(room_id);
        maps.rooms.insert(room_id.to_string(), Arc::clone(&room));
        maps.streams
            .insert(room.stream_id.clone(), Arc::clone(&room));
        tracing::info!(%room_id, stream_id = %room.stream_id, "room created");
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.inner.read().await.rooms.get(room_id).cloned()
    }

    pub async fn get_by_stream(&self, stream_id: &str) -> Option<Arc<Room>> {
        self.inner.read().await.streams.get(stream_id).cloned()
    }

    /// Clone out the current room set. The read lock is held only while the
    /// handles are copied, so callers can do slow per-room work lock-free.
    pub async fn snapshot(&self) -> Vec<Arc<Room>> {
        self.inner.read().await.rooms.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically solicit keyframes from every broadcaster so that viewers
/// joining mid-stream can start decoding quickly after renegotiation.
pub fn spawn_keyframe_ticker(registry: Arc<RoomRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(KEYFRAME_INTERVAL);
        loop {
            ticker.tick().await;
            for room in registry.snapshot().await {
                room.peers.dispatch_keyframes().await;
            }
        }
    })
}
