use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use beacon_protocol::{BeaconConfig, CandidatePayload, Envelope, SdpPayload, SignalEvent};
use futures_util::StreamExt;
use futures_util::stream::SplitStream;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

use crate::rooms::Room;
use crate::sfu::{Peer, PeerRole, SignalWriter};

/// RTP read buffer, sized for a typical MTU.
const RTP_MTU: usize = 1500;

/// ICE configuration per the deployment environment: empty in development
/// (host candidates only), relay-only through the TURN server with
/// password-type long-term credentials in production.
fn rtc_configuration(config: &BeaconConfig) -> RTCConfiguration {
    if !config.environment.is_production() {
        return RTCConfiguration::default();
    }

    let ice = &config.ice;
    let mut servers = Vec::new();
    if !ice.stun_urls.is_empty() {
        servers.push(RTCIceServer {
            urls: ice.stun_urls.clone(),
            ..Default::default()
        });
    }
    servers.push(RTCIceServer {
        urls: ice.turn_urls.clone(),
        username: ice.turn_username.clone().unwrap_or_default(),
        credential: ice.turn_credential.clone().unwrap_or_default(),
    });
    RTCConfiguration {
        ice_servers: servers,
        ice_transport_policy: RTCIceTransportPolicy::Relay,
        ..Default::default()
    }
}

async fn new_peer_connection(config: &BeaconConfig) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .context("failed to register codecs")?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .context("failed to register interceptors")?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = api
        .new_peer_connection(rtc_configuration(config))
        .await
        .context("failed to create peer connection")?;
    Ok(Arc::new(pc))
}

struct PeerSession {
    pc: Arc<RTCPeerConnection>,
    writer: Arc<SignalWriter>,
    reader: SplitStream<WebSocket>,
}

/// Common connect sequence for both roles: create the peer connection, add
/// recvonly transceivers for video and audio, register with the room's peer
/// set, and install the ICE and connection-state callbacks.
async fn attach_peer(
    socket: WebSocket,
    room: &Arc<Room>,
    config: &BeaconConfig,
    role: PeerRole,
) -> Result<PeerSession> {
    let (sink, reader) = socket.split();
    let writer = SignalWriter::new(sink);

    let pc = new_peer_connection(config).await?;

    for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
        pc.add_transceiver_from_kind(
            kind,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .context("failed to add transceiver")?;
    }

    room.peers
        .register(Peer {
            pc: Arc::clone(&pc),
            writer: Arc::clone(&writer),
            role,
        })
        .await;

    // Trickle ICE: local candidates go out as canonical JSON.
    {
        let writer = Arc::clone(&writer);
        let room_id = room.id.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let writer = Arc::clone(&writer);
            let room_id = room_id.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(err) => {
                        warn!(room = %room_id, "failed to serialize ICE candidate: {err}");
                        return;
                    }
                };
                let payload = CandidatePayload {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                match payload.to_json() {
                    Ok(json) => {
                        if let Err(err) = writer.send(&Envelope::candidate(json)).await {
                            debug!(room = %room_id, "failed to send ICE candidate: {err}");
                        }
                    }
                    Err(err) => {
                        warn!(room = %room_id, "failed to encode ICE candidate: {err}");
                    }
                }
            })
        }));
    }

    // Failed connections are closed proactively; closed ones are reaped by
    // the renegotiation pass the state change schedules.
    {
        let weak_pc = Arc::downgrade(&pc);
        let peers = Arc::clone(&room.peers);
        let room_id = room.id.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let weak_pc = weak_pc.clone();
            let peers = Arc::clone(&peers);
            let room_id = room_id.clone();
            Box::pin(async move {
                debug!(room = %room_id, ?state, "peer connection state changed");
                match state {
                    RTCPeerConnectionState::Failed => {
                        if let Some(pc) = weak_pc.upgrade()
                            && let Err(err) = pc.close().await
                        {
                            warn!(room = %room_id, "failed to close failed connection: {err}");
                        }
                    }
                    RTCPeerConnectionState::Closed => {
                        peers.signal().await;
                    }
                    _ => {}
                }
            })
        }));
    }

    Ok(PeerSession { pc, writer, reader })
}

/// Publish every remote track into the room's registry and pump its RTP
/// into the forwarding track until the source ends.
fn install_track_forwarder(pc: &Arc<RTCPeerConnection>, room: &Arc<Room>) {
    let peers = Arc::clone(&room.peers);
    let room_id = room.id.clone();
    pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
        let peers = Arc::clone(&peers);
        let room_id = room_id.clone();
        Box::pin(async move {
            info!(
                room = %room_id,
                track = %remote.id(),
                kind = ?remote.kind(),
                "remote track attached"
            );
            // The forwarding loop runs on its own task so a slow or dead
            // viewer can never stall the peer connection's event handling,
            // and it never touches the peer-set lock.
            tokio::spawn(async move {
                let local = peers
                    .add_track(remote.codec().capability, remote.id(), remote.stream_id())
                    .await;
                let mut buf = vec![0u8; RTP_MTU];
                loop {
                    let packet = match remote.read(&mut buf).await {
                        Ok((packet, _)) => packet,
                        Err(err) => {
                            debug!(room = %room_id, track = %local.id(), "remote track ended: {err}");
                            break;
                        }
                    };
                    if let Err(err) = local.write_rtp(&packet).await {
                        debug!(room = %room_id, track = %local.id(), "forwarding write failed: {err}");
                        break;
                    }
                }
                peers.remove_track(&local).await;
            });
        })
    }));
}

/// Handle a broadcaster WebSocket for its whole lifetime.
///
/// The broadcaster proposes its outbound media with an `offer`; the server
/// answers and starts forwarding whatever tracks arrive. The connection is
/// closed when the socket drops, which lets the next renegotiation pass
/// reap the peer.
pub async fn broadcaster_session(socket: WebSocket, room: Arc<Room>, config: BeaconConfig) {
    let mut session = match attach_peer(socket, &room, &config, PeerRole::Broadcaster).await {
        Ok(session) => session,
        Err(err) => {
            warn!(room = %room.id, "broadcaster setup failed: {err:#}");
            return;
        }
    };
    install_track_forwarder(&session.pc, &room);

    // Sync immediately: viewers that connected early get their offer as
    // soon as this broadcaster's first track lands.
    room.peers.signal().await;

    while let Some(frame) = session.reader.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                debug!(room = %room.id, "broadcaster websocket error: {err}");
                break;
            }
        };
        let Some(envelope) = decode_frame(&message) else {
            break;
        };
        match envelope.event {
            SignalEvent::Offer => {
                if let Err(err) = answer_publisher_offer(&session, &envelope.data).await {
                    warn!(room = %room.id, "failed to answer broadcaster offer: {err:#}");
                }
            }
            SignalEvent::Candidate => {
                add_remote_candidate(&session.pc, &room.id, &envelope.data).await;
            }
            event => {
                debug!(room = %room.id, %event, "ignoring frame from broadcaster");
            }
        }
    }

    if let Err(err) = session.pc.close().await {
        debug!(room = %room.id, "error closing broadcaster connection: {err}");
    }
    info!(room = %room.id, "broadcaster disconnected");
}

/// Handle a viewer WebSocket for its whole lifetime.
///
/// The viewer is driven by server offers from the renegotiation engine; it
/// sends back answers and ICE candidates, and may terminate the stream with
/// `duress-stop`.
pub async fn viewer_session(socket: WebSocket, room: Arc<Room>, config: BeaconConfig) {
    let mut session = match attach_peer(socket, &room, &config, PeerRole::Viewer).await {
        Ok(session) => session,
        Err(err) => {
            warn!(room = %room.id, "viewer setup failed: {err:#}");
            return;
        }
    };

    // Late-join guarantee: an offer reflecting the current track set goes
    // out in the pass triggered here.
    room.peers.signal().await;

    while let Some(frame) = session.reader.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                debug!(room = %room.id, "viewer websocket error: {err}");
                break;
            }
        };
        let Some(envelope) = decode_frame(&message) else {
            break;
        };
        match envelope.event {
            SignalEvent::Candidate => {
                add_remote_candidate(&session.pc, &room.id, &envelope.data).await;
            }
            SignalEvent::Answer => {
                let payload = SdpPayload::parse(&envelope.data);
                match RTCSessionDescription::answer(payload.sdp) {
                    Ok(answer) => {
                        if let Err(err) = session.pc.set_remote_description(answer).await {
                            warn!(room = %room.id, "failed to apply viewer answer: {err}");
                        }
                    }
                    Err(err) => {
                        warn!(room = %room.id, "invalid viewer answer SDP: {err}");
                    }
                }
            }
            SignalEvent::DuressStop => {
                info!(room = %room.id, "viewer requested duress stop");
                break;
            }
            event => {
                debug!(room = %room.id, %event, "ignoring frame from viewer");
            }
        }
    }

    if let Err(err) = session.pc.close().await {
        debug!(room = %room.id, "error closing viewer connection: {err}");
    }
    info!(room = %room.id, "viewer disconnected");
}

/// Decode one WebSocket message into a signaling envelope. Returns `None`
/// on close frames; control frames yield `unknown` envelopes that the
/// dispatcher drops.
fn decode_frame(message: &Message) -> Option<Envelope> {
    match message {
        Message::Text(text) => Some(Envelope::decode(text.as_bytes())),
        Message::Binary(data) => Some(Envelope::decode(data)),
        Message::Close(_) => None,
        // Ping/pong are answered by the transport layer.
        _ => Some(Envelope::new(SignalEvent::Unknown, "")),
    }
}

/// Set the broadcaster's offer as remote description and reply with an
/// answer, sent as plain SDP text.
async fn answer_publisher_offer(session: &PeerSession, data: &str) -> Result<()> {
    let payload = SdpPayload::parse(data);
    let offer = RTCSessionDescription::offer(payload.sdp).context("invalid SDP offer")?;
    session
        .pc
        .set_remote_description(offer)
        .await
        .context("failed to set remote description")?;
    let answer = session
        .pc
        .create_answer(None)
        .await
        .context("failed to create answer")?;
    session
        .pc
        .set_local_description(answer.clone())
        .await
        .context("failed to set local description")?;
    session
        .writer
        .send(&Envelope::answer(answer.sdp))
        .await
        .context("failed to send answer")
}

/// Add a remote ICE candidate, accepting both the JSON init object and the
/// bare candidate string.
async fn add_remote_candidate(pc: &Arc<RTCPeerConnection>, room_id: &str, data: &str) {
    let payload = CandidatePayload::parse(data);
    let init = RTCIceCandidateInit {
        candidate: payload.candidate,
        sdp_mid: payload.sdp_mid,
        sdp_mline_index: payload.sdp_m_line_index,
        username_fragment: payload.username_fragment,
    };
    if let Err(err) = pc.add_ice_candidate(init).await {
        warn!(room = %room_id, "failed to add remote ICE candidate: {err}");
    }
}
