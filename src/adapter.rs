//! Seam between the signaling relay and a peer connection implementation.

use crate::error::Error;
use crate::media::LocalMedia;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_remote::TrackRemote;

/// Peer connection operations the relay drives. Session descriptions and candidates are opaque
/// to the relay, it only moves them between the control channel and the adapter.
#[async_trait]
pub trait PeerAdapter: Send + Sync {
    /// Creates an offer and sets it as the local description.
    async fn create_offer(&self) -> Result<RTCSessionDescription, Error>;

    /// Applies a remote offer, then creates an answer and sets it as the local description.
    async fn accept_offer(&self, offer: RTCSessionDescription)
        -> Result<RTCSessionDescription, Error>;

    /// Applies the remote answer to an offer previously produced by this adapter.
    async fn accept_answer(&self, answer: RTCSessionDescription) -> Result<(), Error>;

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), Error>;

    /// Sends text over the labeled data channel.
    async fn send_text(&self, text: String) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}

/// Constructs fresh peer adapters. Each adapter is given the local media to attach and an event
/// sink stamped with the adapter's generation.
#[async_trait]
pub trait Connector: Send + Sync {
    type Peer: PeerAdapter;

    async fn connect(&self, media: &LocalMedia, events: PeerEvents) -> Result<Self::Peer, Error>;
}

/// Remote media track announced by the peer connection.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: String,
    pub track: Option<Arc<TrackRemote>>,
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum PeerEvent {
    LocalCandidate(RTCIceCandidateInit),
    RemoteTrack(RemoteTrack),
    Connected,
    Disconnected,
    /// Negotiation or transport failure reported by the peer connection itself.
    Failed(Error),
    /// `remote` is set for channels created by the other side.
    DataChannelOpen { label: String, remote: bool },
    DataChannelMessage { label: String, data: Bytes },
    DataChannelError { label: String, error: Error },
    DataChannelClosed { label: String },
}

/// Adapter event tagged with the generation of the adapter that produced it.
#[derive(Debug, Clone)]
pub struct TaggedPeerEvent {
    pub generation: u64,
    pub event: PeerEvent,
}

/// Sending half of the adapter event queue.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    generation: u64,
    sender: UnboundedSender<TaggedPeerEvent>,
}

impl PeerEvents {
    pub fn new(generation: u64, sender: UnboundedSender<TaggedPeerEvent>) -> Self {
        PeerEvents { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the relay stopped listening.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.sender
            .send(TaggedPeerEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
