use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use beacon_protocol::Envelope;
use futures_util::SinkExt;
use futures_util::future::BoxFuture;
use futures_util::stream::SplitSink;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

/// Renegotiation gives up and defers after this many restarted passes.
/// WebRTC state races during ICE are frequent and benign, so optimistic
/// retry beats holding the room locked while a peer settles.
const MAX_SYNC_ATTEMPTS: usize = 25;

/// Delay before a deferred renegotiation re-run.
const RESYNC_DELAY: std::time::Duration = std::time::Duration::from_secs(3);

/// Which side of the room a peer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Broadcaster,
    Viewer,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Broadcaster => f.write_str("broadcaster"),
            PeerRole::Viewer => f.write_str("viewer"),
        }
    }
}

/// Serializes concurrent JSON writes onto one WebSocket.
///
/// Renegotiation offers, per-peer ICE callbacks and the keyframe ticker can
/// all write at once; the mutex is held for the duration of a single frame
/// so writes on one socket are totally ordered and never interleave. Reads
/// are not synchronized; only the owning handler task reads.
pub struct SignalWriter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl SignalWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(sink),
        })
    }

    pub async fn send(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let json = envelope.to_json()?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

/// One registered peer: its connection, its serialized writer, its role.
/// The handler task owns the connection; this record is only used for
/// signaling fan-out and renegotiation.
pub struct Peer {
    pub pc: Arc<RTCPeerConnection>,
    pub writer: Arc<SignalWriter>,
    pub role: PeerRole,
}

/// Per-room connection stats, shape matching the stream info endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub active_tracks: usize,
}

#[derive(Default)]
struct PeersInner {
    connections: Vec<Peer>,
    track_locals: HashMap<String, Arc<TrackLocalStaticRTP>>,
    last_offer: Option<String>,
}

/// The peer set and track registry of one room, plus the last-offer cache.
///
/// A single lock guards all three: renegotiation mutates connections and
/// senders against the current track set atomically. The broadcaster's RTP
/// forwarding loop never takes this lock; it holds its own handle to the
/// forwarding track.
pub struct RoomPeers {
    room_id: String,
    inner: RwLock<PeersInner>,
    resync_pending: AtomicBool,
}

impl RoomPeers {
    pub fn new(room_id: &str) -> Arc<Self> {
        Arc::new(Self {
            room_id: room_id.to_string(),
            inner: RwLock::new(PeersInner::default()),
            resync_pending: AtomicBool::new(false),
        })
    }

    /// Register a newly connected peer. The caller is expected to follow up
    /// with a renegotiation pass once its callbacks are installed.
    pub async fn register(&self, peer: Peer) {
        let role = peer.role;
        let total = {
            let mut inner = self.inner.write().await;
            inner.connections.push(peer);
            inner.connections.len()
        };
        info!(room = %self.room_id, %role, total, "peer registered");
    }

    /// Allocate a forwarding track fed from a broadcaster's remote track and
    /// publish it to the registry. Schedules a renegotiation pass so every
    /// viewer picks up a sender for it.
    pub async fn add_track(
        self: &Arc<Self>,
        capability: RTCRtpCodecCapability,
        track_id: String,
        track_stream_id: String,
    ) -> Arc<TrackLocalStaticRTP> {
        let local = Arc::new(TrackLocalStaticRTP::new(
            capability,
            track_id.clone(),
            track_stream_id,
        ));
        {
            let mut inner = self.inner.write().await;
            inner.track_locals.insert(track_id.clone(), Arc::clone(&local));
        }
        info!(room = %self.room_id, track = %track_id, "forwarding track added");
        self.signal().await;
        local
    }

    /// Drop a forwarding track (source track ended or errored). Schedules a
    /// renegotiation pass so viewers shed their senders for it.
    pub async fn remove_track(self: &Arc<Self>, track: &TrackLocalStaticRTP) {
        {
            let mut inner = self.inner.write().await;
            inner.track_locals.remove(track.id());
        }
        info!(room = %self.room_id, track = %track.id(), "forwarding track removed");
        self.signal().await;
    }

    /// Run a renegotiation pass: reconcile every peer's sender set with the
    /// track registry and send each one a fresh offer.
    ///
    /// Any step that fails restarts the whole pass, up to [`MAX_SYNC_ATTEMPTS`]
    /// times; if the pass is still dirty after that, a single deferred re-run
    /// is scheduled so an eventual state change can unblock it. At most one
    /// deferred re-run is pending per room at any time.
    ///
    /// Returns a boxed future so the deferred re-run can re-enter without
    /// building an infinitely recursive future type.
    pub fn signal(self: &Arc<Self>) -> BoxFuture<'static, ()> {
        let peers = Arc::clone(self);
        Box::pin(async move {
            let mut dirty = true;
            {
                let mut inner = peers.inner.write().await;
                for _ in 0..MAX_SYNC_ATTEMPTS {
                    dirty = peers.attempt_sync(&mut inner).await;
                    if !dirty {
                        break;
                    }
                }
            }
            peers.dispatch_keyframes().await;
            if dirty {
                peers.schedule_resync();
            }
        })
    }

    /// One reconciliation pass over the peer list. Returns true if the pass
    /// must be restarted (peer reaped or a WebRTC/transport step failed).
    async fn attempt_sync(&self, inner: &mut PeersInner) -> bool {
        for i in 0..inner.connections.len() {
            let pc = Arc::clone(&inner.connections[i].pc);

            if pc.connection_state() == RTCPeerConnectionState::Closed {
                inner.connections.remove(i);
                debug!(room = %self.room_id, "reaped closed peer connection");
                return true;
            }

            // Track ids this peer already carries, on senders or receivers.
            // A track present on a receiver must not be re-added as a sender.
            let mut existing: HashSet<String> = HashSet::new();
            for sender in pc.get_senders().await {
                let Some(track) = sender.track().await else {
                    continue;
                };
                let id = track.id().to_string();
                let stale = !inner.track_locals.contains_key(&id);
                existing.insert(id);
                if stale && let Err(err) = pc.remove_track(&sender).await {
                    warn!(room = %self.room_id, "failed to remove stale sender: {err}");
                    return true;
                }
            }
            for receiver in pc.get_receivers().await {
                if let Some(track) = receiver.tracks().await.into_iter().next() {
                    existing.insert(track.id());
                }
            }

            for (id, track) in inner.track_locals.iter() {
                if existing.contains(id) {
                    continue;
                }
                if let Err(err) = pc
                    .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                {
                    warn!(room = %self.room_id, track = %id, "failed to add forwarding track: {err}");
                    return true;
                }
            }

            let offer = match pc.create_offer(None).await {
                Ok(offer) => offer,
                Err(err) => {
                    warn!(room = %self.room_id, "failed to create offer: {err}");
                    return true;
                }
            };
            if let Err(err) = pc.set_local_description(offer.clone()).await {
                warn!(room = %self.room_id, "failed to set local description: {err}");
                return true;
            }

            let offer_json = match serde_json::to_string(&offer) {
                Ok(json) => json,
                Err(err) => {
                    warn!(room = %self.room_id, "failed to serialize offer: {err}");
                    return true;
                }
            };
            inner.last_offer = Some(offer_json.clone());

            if let Err(err) = inner.connections[i]
                .writer
                .send(&Envelope::offer(offer_json))
                .await
            {
                warn!(room = %self.room_id, "failed to send offer: {err}");
                return true;
            }
        }
        false
    }

    /// Queue a single deferred renegotiation re-run. Re-runs are coalesced:
    /// while one is pending, further requests are no-ops.
    fn schedule_resync(self: &Arc<Self>) {
        if self.resync_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(room = %self.room_id, "deferring renegotiation re-run");
        let peers = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RESYNC_DELAY).await;
            peers.resync_pending.store(false, Ordering::SeqCst);
            peers.signal().await;
        });
    }

    /// Ask every broadcaster for a keyframe: one Picture Loss Indication per
    /// RTP receiver that currently carries a track. Best-effort, errors are
    /// swallowed.
    pub async fn dispatch_keyframes(&self) {
        let inner = self.inner.read().await;
        for peer in inner.connections.iter() {
            for receiver in peer.pc.get_receivers().await {
                let Some(track) = receiver.tracks().await.into_iter().next() else {
                    continue;
                };
                let _ = peer
                    .pc
                    .write_rtcp(&[Box::new(PictureLossIndication {
                        sender_ssrc: 0,
                        media_ssrc: track.ssrc(),
                    })])
                    .await;
            }
        }
    }

    /// Fan an envelope out to every peer in the room.
    pub async fn broadcast(&self, envelope: &Envelope) {
        let inner = self.inner.read().await;
        for peer in inner.connections.iter() {
            if let Err(err) = peer.writer.send(envelope).await {
                debug!(room = %self.room_id, role = %peer.role, "broadcast send failed: {err}");
            }
        }
    }

    /// Fan an envelope out to every peer of one role.
    pub async fn broadcast_to_role(&self, role: PeerRole, envelope: &Envelope) {
        let inner = self.inner.read().await;
        for peer in inner.connections.iter().filter(|p| p.role == role) {
            if let Err(err) = peer.writer.send(envelope).await {
                debug!(room = %self.room_id, role = %peer.role, "broadcast send failed: {err}");
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        let inner = self.inner.read().await;
        ConnectionStats {
            total_connections: inner.connections.len(),
            active_tracks: inner.track_locals.len(),
        }
    }

    /// The most recent offer sent to any peer in this room, if one exists.
    pub async fn last_offer(&self) -> Option<String> {
        self.inner.read().await.last_offer.clone()
    }
}
