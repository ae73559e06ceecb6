use crate::adapter::{Connector, PeerAdapter, PeerEvent, PeerEvents, RemoteTrack};
use crate::config::Options;
use crate::data_channel::DataChannel;
use crate::error::Error;
use crate::media::LocalMedia;
use arc_swap::{ArcSwap, Guard};
use async_trait::async_trait;
use std::fmt::Formatter;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// [PeerAdapter] backed by a webrtc-rs peer connection.
pub struct PeerConnection {
    pc: Arc<RTCPeerConnection>,
    status: PeerConnectionState,
    data_channel: DataChannel,
    /// Channels opened by the remote side. Kept so that their handlers stay registered.
    remote_channels: Arc<std::sync::Mutex<Vec<DataChannel>>>,
    /// Remote candidates received before the remote description was set.
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
}

impl PeerConnection {
    /// Starts a new instance of [PeerConnection] with `media` tracks attached and a data channel
    /// labeled after [Options::data_channel_label]. Local candidates, remote tracks, connection
    /// state changes and data channel activity are reported through `events`.
    pub async fn start(
        options: &Options,
        media: &LocalMedia,
        events: PeerEvents,
    ) -> Result<Self, Error> {
        // Create a MediaEngine object to configure the supported codec
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionUnsupported(e.to_string()))?;

        // Create a InterceptorRegistry. This is the user configurable RTP/RTCP Pipeline.
        // This provides NACKs, RTCP Reports and other features. You MUST create
        // a InterceptorRegistry for each PeerConnection.
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::PeerConnectionUnsupported(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let status = PeerConnectionState::default();
        let peer_connection =
            Arc::new(api.new_peer_connection(options.rtc_configuration()).await?);

        {
            let status = status.weak_ref();
            let events = events.clone();
            peer_connection.on_peer_connection_state_change(Box::new(move |s| {
                log::debug!("peer connection state changed: {}", s);
                if let Some(status) = PeerConnectionState::upgrade(&status) {
                    match s {
                        RTCPeerConnectionState::Connected => {
                            let _ = status.set_ready();
                            events.emit(PeerEvent::Connected);
                        }
                        RTCPeerConnectionState::Failed => {
                            let e: Error = webrtc::Error::ErrConnectionClosed.into();
                            let _ = status.set_failed(e.clone());
                            events.emit(PeerEvent::Failed(e));
                        }
                        RTCPeerConnectionState::Disconnected => {
                            events.emit(PeerEvent::Disconnected);
                        }
                        RTCPeerConnectionState::Closed => {
                            let _ = status.set_closed();
                        }
                        RTCPeerConnectionState::Unspecified
                        | RTCPeerConnectionState::New
                        | RTCPeerConnectionState::Connecting => {}
                    }
                }
                Box::pin(async move {})
            }));
        }
        {
            let events = events.clone();
            peer_connection.on_ice_candidate(Box::new(move |candidate| {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            events.emit(PeerEvent::LocalCandidate(init));
                        }
                        Err(e) => log::warn!("failed to serialize local candidate: {}", e),
                    }
                } else {
                    // ICE gathering complete
                }
                Box::pin(async move {})
            }));
        }
        {
            let events = events.clone();
            peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind: track.kind().to_string(),
                    track: Some(track),
                };
                events.emit(PeerEvent::RemoteTrack(remote));
                Box::pin(async move {})
            }));
        }
        let remote_channels = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let events = events.clone();
            let channels = Arc::downgrade(&remote_channels);
            peer_connection.on_data_channel(Box::new(move |dc| {
                log::debug!("remote opened data channel '{}'", dc.label());
                let dc = DataChannel::new(dc, true, events.clone());
                if let Some(channels) = channels.upgrade() {
                    if let Ok(mut channels) = channels.lock() {
                        channels.push(dc);
                    }
                }
                Box::pin(async move {})
            }));
        }

        for track in media.tracks() {
            peer_connection.add_track(track.clone()).await?;
        }

        let dc = peer_connection
            .create_data_channel(&options.data_channel_label, None)
            .await?;
        let data_channel = DataChannel::new(dc, false, events);

        Ok(PeerConnection {
            pc: peer_connection,
            status,
            data_channel,
            remote_channels,
            pending_candidates: Mutex::new(Vec::new()),
        })
    }

    /// Data channel created by this side of the connection.
    pub fn data_channel(&self) -> &DataChannel {
        &self.data_channel
    }

    /// This method allows to await until the peer connection transport is established.
    pub async fn connected(&self) -> Result<(), Error> {
        status_connected(&self.status).await
    }

    /// Replays candidates received before the remote description. A rejected candidate is
    /// logged and skipped.
    async fn flush_pending_candidates(&self) {
        let mut pending = self.pending_candidates.lock().await;
        for candidate in pending.drain(..) {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                log::warn!("dropping buffered ICE candidate: {}", e);
            }
        }
    }
}

#[async_trait]
impl PeerAdapter for PeerConnection {
    async fn create_offer(&self) -> Result<RTCSessionDescription, Error> {
        if self.status.get().is_closed() {
            return Err(Error::ChannelClosed);
        }
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn accept_offer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, Error> {
        if self.status.get().is_closed() {
            return Err(Error::ChannelClosed);
        }
        self.pc.set_remote_description(offer).await?;
        self.flush_pending_candidates().await;
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn accept_answer(&self, answer: RTCSessionDescription) -> Result<(), Error> {
        self.pc.set_remote_description(answer).await?;
        self.flush_pending_candidates().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), Error> {
        if self.pc.remote_description().await.is_some() {
            self.pc.add_ice_candidate(candidate).await?;
        } else {
            let mut pending = self.pending_candidates.lock().await;
            pending.push(candidate);
        }
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), Error> {
        self.data_channel.send_text(text).await
    }

    /// Gracefully close current [PeerConnection].
    async fn close(&self) -> Result<(), Error> {
        let _ = self.status.set_closed();
        if let Err(e) = self.data_channel.close().await {
            log::debug!("data channel '{}' close: {}", self.data_channel.label(), e);
        }
        self.pc.close().await?;
        Ok(())
    }
}

impl AsRef<RTCPeerConnection> for PeerConnection {
    fn as_ref(&self) -> &RTCPeerConnection {
        &self.pc
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("status", &**self.status.get())
            .field("data_channel", &self.data_channel)
            .finish()
    }
}

/// [Connector] producing webrtc-rs [PeerConnection]s configured by [Options].
#[derive(Debug, Clone, Default)]
pub struct RtcConnector {
    options: Options,
}

impl RtcConnector {
    pub fn new(options: Options) -> Self {
        RtcConnector { options }
    }
}

#[async_trait]
impl Connector for RtcConnector {
    type Peer = PeerConnection;

    async fn connect(
        &self,
        media: &LocalMedia,
        events: PeerEvents,
    ) -> Result<PeerConnection, Error> {
        PeerConnection::start(&self.options, media, events).await
    }
}

async fn status_connected(status: &PeerConnectionState) -> Result<(), Error> {
    loop {
        let s = status.get();
        match &**s {
            InnerState::Waiting(ready) => {
                let notified = ready.notified();
                if status.get().is_waiting() {
                    notified.await;
                }
            }
            InnerState::Ready => return Ok(()),
            InnerState::Closed(err) => {
                return if let Some(e) = err {
                    Err(e.clone())
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[repr(transparent)]
#[derive(Debug, Clone)]
struct PeerConnectionState(Arc<ArcSwap<InnerState>>);

impl PeerConnectionState {
    fn get(&self) -> Guard<Arc<InnerState>> {
        self.0.load()
    }

    fn weak_ref(&self) -> Weak<ArcSwap<InnerState>> {
        Arc::downgrade(&self.0)
    }

    fn upgrade(w: &Weak<ArcSwap<InnerState>>) -> Option<Self> {
        let arc = w.upgrade()?;
        Some(PeerConnectionState(arc))
    }

    fn set_ready(&self) -> Result<(), Error> {
        self.update(InnerState::ready())
    }

    fn set_closed(&self) -> Result<(), Error> {
        self.update(InnerState::closed_gracefully())
    }

    fn set_failed(&self, cause: Error) -> Result<(), Error> {
        self.update(InnerState::failed(cause))
    }

    fn update(&self, new_state: Arc<InnerState>) -> Result<(), Error> {
        let old = self.0.rcu(move |old| {
            if old.is_closed() {
                old.clone()
            } else {
                new_state.clone()
            }
        });
        match &*old {
            InnerState::Waiting(ready) => ready.notify_waiters(),
            InnerState::Ready => {}
            InnerState::Closed(cause) => {
                if let Some(cause) = cause {
                    return Err(cause.clone());
                }
            }
        }
        Ok(())
    }
}

impl Default for PeerConnectionState {
    fn default() -> Self {
        PeerConnectionState(Arc::new(ArcSwap::new(InnerState::waiting())))
    }
}

#[derive(Debug)]
enum InnerState {
    Waiting(Notify),
    Ready,
    Closed(Option<Error>),
}

impl InnerState {
    fn waiting() -> Arc<Self> {
        Arc::new(InnerState::Waiting(Notify::new()))
    }

    fn ready() -> Arc<Self> {
        Arc::new(InnerState::Ready)
    }

    fn closed_gracefully() -> Arc<Self> {
        Arc::new(InnerState::Closed(None))
    }

    fn failed(e: Error) -> Arc<Self> {
        Arc::new(InnerState::Closed(Some(e)))
    }

    fn is_waiting(&self) -> bool {
        matches!(self, InnerState::Waiting(_))
    }

    fn is_closed(&self) -> bool {
        matches!(self, InnerState::Closed(_))
    }
}
