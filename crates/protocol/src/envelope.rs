use serde::{Deserialize, Serialize};

/// Signaling events carried over the duress WebSockets, both directions.
///
/// Anything the decoder does not recognize maps to `Unknown` so that a
/// misbehaving client can never take its own connection down with a bad
/// frame (the dispatcher just logs and drops it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum SignalEvent {
    Offer,
    Answer,
    Candidate,
    DuressAlert,
    DuressStop,
    Unknown,
}

impl SignalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalEvent::Offer => "offer",
            SignalEvent::Answer => "answer",
            SignalEvent::Candidate => "candidate",
            SignalEvent::DuressAlert => "duress-alert",
            SignalEvent::DuressStop => "duress-stop",
            SignalEvent::Unknown => "unknown",
        }
    }
}

impl From<String> for SignalEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "offer" => SignalEvent::Offer,
            "answer" => SignalEvent::Answer,
            "candidate" => SignalEvent::Candidate,
            "duress-alert" => SignalEvent::DuressAlert,
            "duress-stop" => SignalEvent::DuressStop,
            _ => SignalEvent::Unknown,
        }
    }
}

impl std::fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{event, data, roomId?}` JSON frame exchanged on every signaling
/// WebSocket.
///
/// `data` is event-dependent: SDP text for `offer`/`answer`, a JSON
/// ICE candidate for `candidate`, free text otherwise. Clients disagree on
/// the exact `data` encoding, so interpretation goes through the flexible
/// [`SdpPayload`] and [`CandidatePayload`] parsers rather than this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: SignalEvent,
    pub data: String,
    #[serde(rename = "roomId", skip_serializing_if = "Option::is_none", default)]
    pub room_id: Option<String>,
}

impl Envelope {
    pub fn new(event: SignalEvent, data: impl Into<String>) -> Self {
        Self {
            event,
            data: data.into(),
            room_id: None,
        }
    }

    pub fn offer(data: impl Into<String>) -> Self {
        Self::new(SignalEvent::Offer, data)
    }

    pub fn answer(data: impl Into<String>) -> Self {
        Self::new(SignalEvent::Answer, data)
    }

    pub fn candidate(data: impl Into<String>) -> Self {
        Self::new(SignalEvent::Candidate, data)
    }

    pub fn duress_alert(data: impl Into<String>) -> Self {
        Self::new(SignalEvent::DuressAlert, data)
    }

    /// Decode a raw WebSocket frame.
    ///
    /// Never fails: a frame that is not valid envelope JSON degrades to an
    /// `unknown` event carrying the raw bytes as lossy text, so the caller
    /// can log it and keep the connection alive.
    pub fn decode(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(envelope) => envelope,
            Err(_) => Self::new(SignalEvent::Unknown, String::from_utf8_lossy(raw)),
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed to encode signaling envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A session description pulled out of an `offer`/`answer` frame's `data`.
///
/// Accepted shapes: a bare SDP string, or a JSON object `{type, sdp}` as
/// serialized by browser `RTCSessionDescription`s. The event name decides
/// whether it is an offer or an answer; `type_hint` is only what the client
/// claimed, if anything.
#[derive(Debug, Clone, PartialEq)]
pub struct SdpPayload {
    pub type_hint: Option<String>,
    pub sdp: String,
}

#[derive(Deserialize)]
struct SessionDescriptionJson {
    #[serde(rename = "type")]
    sdp_type: Option<String>,
    sdp: String,
}

impl SdpPayload {
    pub fn parse(data: &str) -> Self {
        if let Ok(desc) = serde_json::from_str::<SessionDescriptionJson>(data) {
            return Self {
                type_hint: desc.sdp_type,
                sdp: desc.sdp,
            };
        }
        Self {
            type_hint: None,
            sdp: data.to_string(),
        }
    }
}

/// An ICE candidate pulled out of a `candidate` frame's `data`.
///
/// Accepted shapes: the W3C ICECandidateInit JSON object, or a bare
/// candidate string (treated as `{candidate: data}`). The server always
/// emits the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username_fragment: Option<String>,
}

impl CandidatePayload {
    pub fn parse(data: &str) -> Self {
        if let Ok(candidate) = serde_json::from_str::<CandidatePayload>(data) {
            return candidate;
        }
        Self {
            candidate: data.to_string(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let envelope = Envelope::offer("v=0\r\n...");
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""event":"offer""#));
        assert!(!json.contains("roomId"));
        let parsed = Envelope::decode(json.as_bytes());
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn envelope_roundtrip_with_room_id() {
        let envelope = Envelope {
            event: SignalEvent::Candidate,
            data: "candidate:1 1 UDP ...".to_string(),
            room_id: Some("room-42".to_string()),
        };
        let json = envelope.to_json().unwrap();
        assert!(json.contains(r#""roomId":"room-42""#));
        assert_eq!(Envelope::decode(json.as_bytes()), envelope);
    }

    #[test]
    fn malformed_frame_degrades_to_unknown() {
        let parsed = Envelope::decode(b"hello");
        assert_eq!(parsed.event, SignalEvent::Unknown);
        assert_eq!(parsed.data, "hello");
    }

    #[test]
    fn unrecognized_event_degrades_to_unknown() {
        let parsed = Envelope::decode(br#"{"event":"mystery","data":"x"}"#);
        assert_eq!(parsed.event, SignalEvent::Unknown);
        assert_eq!(parsed.data, "x");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let parsed = Envelope::decode(&[0xff, 0xfe, b'h', b'i']);
        assert_eq!(parsed.event, SignalEvent::Unknown);
        assert!(parsed.data.contains("hi"));
    }

    #[test]
    fn kebab_case_events_decode() {
        let parsed = Envelope::decode(br#"{"event":"duress-stop","data":""}"#);
        assert_eq!(parsed.event, SignalEvent::DuressStop);
        let parsed = Envelope::decode(br#"{"event":"duress-alert","data":"help"}"#);
        assert_eq!(parsed.event, SignalEvent::DuressAlert);
    }

    #[test]
    fn sdp_payload_accepts_bare_string() {
        let payload = SdpPayload::parse("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n");
        assert_eq!(payload.sdp, "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n");
        assert!(payload.type_hint.is_none());
    }

    #[test]
    fn sdp_payload_accepts_session_description_json() {
        let payload = SdpPayload::parse(r#"{"type":"offer","sdp":"v=0\r\n"}"#);
        assert_eq!(payload.sdp, "v=0\r\n");
        assert_eq!(payload.type_hint.as_deref(), Some("offer"));
    }

    #[test]
    fn sdp_payload_json_without_type() {
        let payload = SdpPayload::parse(r#"{"sdp":"v=0\r\n"}"#);
        assert_eq!(payload.sdp, "v=0\r\n");
        assert!(payload.type_hint.is_none());
    }

    #[test]
    fn candidate_payload_accepts_init_json() {
        let data = r#"{"candidate":"candidate:1 1 UDP 2130706431 192.0.2.1 50000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let payload = CandidatePayload::parse(data);
        assert!(payload.candidate.starts_with("candidate:1"));
        assert_eq!(payload.sdp_mid.as_deref(), Some("0"));
        assert_eq!(payload.sdp_m_line_index, Some(0));
        assert!(payload.username_fragment.is_none());
    }

    #[test]
    fn candidate_payload_accepts_bare_string() {
        let payload = CandidatePayload::parse("candidate:2 1 UDP 1694498815 198.51.100.1 3478 typ srflx");
        assert!(payload.candidate.starts_with("candidate:2"));
        assert!(payload.sdp_mid.is_none());
        assert!(payload.sdp_m_line_index.is_none());
    }

    #[test]
    fn candidate_payload_emits_camel_case() {
        let payload = CandidatePayload {
            candidate: "candidate:1".to_string(),
            sdp_mid: Some("audio".to_string()),
            sdp_m_line_index: Some(1),
            username_fragment: None,
        };
        let json = payload.to_json().unwrap();
        assert!(json.contains(r#""sdpMid":"audio""#));
        assert!(json.contains(r#""sdpMLineIndex":1"#));
        assert!(!json.contains("usernameFragment"));
    }
}
