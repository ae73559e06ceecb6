//! Control channel wire format.
//!
//! Every message is a JSON object tagged by its `type` field. Session descriptions and ICE
//! candidates are carried in the same shape browsers produce, so the relay can talk to browser
//! clients connected to the same rendezvous server.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Outbound identity registration (`name`) or the server's acknowledgement (`success`).
    Login {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
    },
    Offer {
        offer: RTCSessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Answer {
        answer: RTCSessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Candidate {
        candidate: RTCIceCandidateInit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Leave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Anything that failed to parse or carries an unrecognized `type`.
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn login(name: impl Into<String>) -> Self {
        Message::Login {
            name: Some(name.into()),
            success: None,
        }
    }

    pub fn login_ack(success: bool) -> Self {
        Message::Login {
            name: None,
            success: Some(success),
        }
    }

    pub fn offer(offer: RTCSessionDescription) -> Self {
        Message::Offer { offer, name: None }
    }

    pub fn answer(answer: RTCSessionDescription) -> Self {
        Message::Answer { answer, name: None }
    }

    pub fn candidate(candidate: RTCIceCandidateInit) -> Self {
        Message::Candidate {
            candidate,
            name: None,
        }
    }

    pub fn leave() -> Self {
        Message::Leave { name: None }
    }

    /// Decodes a control channel payload. Never fails: a payload that cannot be parsed is
    /// logged and turned into [Message::Unknown].
    pub fn decode(payload: &str) -> Self {
        match serde_json::from_str(payload) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("error parsing control message {:?}: {}", payload, e);
                Message::Unknown
            }
        }
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message type tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Login { .. } => "login",
            Message::Offer { .. } => "offer",
            Message::Answer { .. } => "answer",
            Message::Candidate { .. } => "candidate",
            Message::Leave { .. } => "leave",
            Message::Unknown => "unknown",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Message::Login { name, .. }
            | Message::Offer { name, .. }
            | Message::Answer { name, .. }
            | Message::Candidate { name, .. }
            | Message::Leave { name } => name.as_deref(),
            Message::Unknown => None,
        }
    }

    /// Addresses the message. Login requests are never rewritten, they always carry the
    /// identity being registered.
    pub(crate) fn stamp(&mut self, peer: Option<&str>) {
        match self {
            Message::Offer { name, .. }
            | Message::Answer { name, .. }
            | Message::Candidate { name, .. }
            | Message::Leave { name } => *name = peer.map(str::to_owned),
            Message::Login { .. } | Message::Unknown => {}
        }
    }
}
