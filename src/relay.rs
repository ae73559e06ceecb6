//! Signaling relay: the single event loop of a call client.
//!
//! The relay owns the [Session] and the current peer adapter. It turns user [Command]s into
//! control channel messages, dispatches inbound messages to the peer adapter, forwards adapter
//! events back to the control channel and reports everything user-visible as [CallEvent]s.

use crate::adapter::{
    Connector, PeerAdapter, PeerEvent, PeerEvents, RemoteTrack, TaggedPeerEvent,
};
use crate::config::{OfferPolicy, Options};
use crate::error::Error;
use crate::media::{LocalMedia, MediaSource};
use crate::message::Message;
use crate::peer_connection::RtcConnector;
use crate::session::{ConnectionState, Session};
use crate::signaling::{self, SignalingReceiver, SignalingSender};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub const LOGIN_REJECTED: &str = "Login unsuccessful, please try a different name.";

/// User-visible outcome of relay activity, consumed by the presentation layer.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Login accepted: the call panel should replace the login panel.
    LoggedIn,
    LoginRejected,
    /// Blocking notification for the user.
    Alert(String),
    /// Remote video output. `None` clears it.
    RemoteStream(Option<RemoteTrack>),
    PeerChanged(Option<String>),
    StateChanged(ConnectionState),
    /// Text sent by the local user over the data channel.
    Sent(String),
    /// Text received from the remote peer over the data channel.
    Received(String),
}

/// User actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Call(String),
    HangUp,
    Send(String),
}

/// Cloneable front end used to submit [Command]s to a running relay. The relay stops once every
/// handle has been dropped.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: UnboundedSender<Command>,
}

impl RelayHandle {
    pub fn login(&self, name: impl Into<String>) -> Result<(), Error> {
        Ok(self.commands.send(Command::Login(name.into()))?)
    }

    pub fn call(&self, peer: impl Into<String>) -> Result<(), Error> {
        Ok(self.commands.send(Command::Call(peer.into()))?)
    }

    pub fn hang_up(&self) -> Result<(), Error> {
        Ok(self.commands.send(Command::HangUp)?)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        Ok(self.commands.send(Command::Send(text.into()))?)
    }
}

/// Connects to the rendezvous server configured in `options` and spawns a relay driving
/// webrtc-rs peer connections.
pub async fn start<M>(
    options: Options,
    media_source: M,
) -> Result<(RelayHandle, UnboundedReceiver<CallEvent>, JoinHandle<()>), Error>
where
    M: MediaSource + 'static,
{
    let (outbound, inbound) = signaling::connect(&options.signaling_url).await?;
    let connector = RtcConnector::new(options.clone());
    let (relay, events) = Relay::new(&options, connector, media_source, outbound);
    let (commands_tx, commands) = unbounded_channel();
    let task = tokio::spawn(relay.run(inbound, commands));
    Ok((
        RelayHandle {
            commands: commands_tx,
        },
        events,
        task,
    ))
}

pub struct Relay<C: Connector, M: MediaSource> {
    session: Session,
    offer_policy: OfferPolicy,
    connector: C,
    media_source: M,
    media: Option<LocalMedia>,
    peer: Option<C::Peer>,
    /// Generation of the current adapter. Events from older adapters are discarded.
    generation: u64,
    remote_stream: Option<RemoteTrack>,
    signaling: SignalingSender,
    peer_events_tx: UnboundedSender<TaggedPeerEvent>,
    peer_events: Option<UnboundedReceiver<TaggedPeerEvent>>,
    ui: UnboundedSender<CallEvent>,
}

impl<C: Connector, M: MediaSource> Relay<C, M> {
    pub fn new(
        options: &Options,
        connector: C,
        media_source: M,
        signaling: SignalingSender,
    ) -> (Self, UnboundedReceiver<CallEvent>) {
        let (ui, ui_events) = unbounded_channel();
        let (peer_events_tx, peer_events) = unbounded_channel();
        let relay = Relay {
            session: Session::default(),
            offer_policy: options.offer_policy,
            connector,
            media_source,
            media: None,
            peer: None,
            generation: 0,
            remote_stream: None,
            signaling,
            peer_events_tx,
            peer_events: Some(peer_events),
            ui,
        };
        (relay, ui_events)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns true when a peer adapter is ready to negotiate a call.
    pub fn is_armed(&self) -> bool {
        self.peer.is_some()
    }

    pub fn remote_stream(&self) -> Option<&RemoteTrack> {
        self.remote_stream.as_ref()
    }

    /// Runs the relay until every [RelayHandle] is dropped. Losing the control channel does
    /// not stop the loop: subsequent sends fail and are reported as errors.
    pub async fn run(
        mut self,
        mut inbound: SignalingReceiver,
        mut commands: UnboundedReceiver<Command>,
    ) {
        let Some(mut peer_events) = self.peer_events.take() else {
            log::error!("relay is already running");
            return;
        };
        let mut inbound_open = true;
        loop {
            tokio::select! {
                msg = inbound.recv(), if inbound_open => match msg {
                    Some(msg) => self.dispatch(msg).await,
                    None => {
                        log::warn!("signaling connection lost");
                        inbound_open = false;
                    }
                },
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if let Err(e) = self.execute(cmd).await {
                            log::warn!("command failed: {}", e);
                        }
                    }
                    None => break,
                },
                Some(event) = peer_events.recv() => self.handle_peer_event(event).await,
            }
        }
        self.disarm().await;
        log::info!("relay stopped");
    }

    /// Handles adapter events that are already queued. The run loop does this continuously,
    /// this method is meant for driving a relay by hand.
    pub async fn flush_peer_events(&mut self) {
        if let Some(mut rx) = self.peer_events.take() {
            while let Ok(event) = rx.try_recv() {
                self.handle_peer_event(event).await;
            }
            self.peer_events = Some(rx);
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Login(name) => self.login(&name),
            Command::Call(peer) => self.call(&peer).await,
            Command::HangUp => self.hang_up().await,
            Command::Send(text) => self.send_text(text).await,
        }
    }

    /// Requests registration of `name` with the rendezvous server. Empty names are ignored.
    pub fn login(&mut self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Ok(());
        }
        log::info!("logging in as '{}'", name);
        self.session.set_local_name(name);
        self.send(Message::login(name))
    }

    /// Starts a call with `peer` by sending it an offer. Empty names are ignored. A call in
    /// progress with someone else is left first, so the offer is made on a fresh adapter.
    pub async fn call(&mut self, peer: &str) -> Result<(), Error> {
        if peer.is_empty() {
            return Ok(());
        }
        if let Some(current) = self.session.peer_name().map(str::to_owned) {
            if current != peer {
                log::info!("leaving '{}' to call '{}'", current, peer);
                self.leave_current(&current);
                self.reset_call().await;
            }
        }
        if self.peer.is_none() {
            return Err(Error::NotConnected);
        }
        log::info!("calling '{}'", peer);
        self.set_peer(Some(peer));
        let result = match &self.peer {
            Some(adapter) => adapter.create_offer().await,
            None => Err(Error::NotConnected),
        };
        match result {
            Ok(offer) => self.send(Message::offer(offer)),
            Err(e) => {
                self.negotiation_failed(e);
                Ok(())
            }
        }
    }

    /// Notifies the peer and tears the call down.
    pub async fn hang_up(&mut self) -> Result<(), Error> {
        log::info!("hanging up");
        let sent = self.send(Message::leave());
        self.reset_call().await;
        sent
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.notify(CallEvent::Sent(text.clone()));
        match &self.peer {
            Some(adapter) => adapter.send_text(text).await,
            None => Err(Error::NotConnected),
        }
    }

    /// Routes an inbound control channel message to its handler.
    pub async fn dispatch(&mut self, msg: Message) {
        let result = match msg {
            Message::Login { success, .. } => {
                // only an explicit refusal counts as a failed login
                self.on_login(success != Some(false)).await;
                Ok(())
            }
            Message::Offer { offer, name } => self.on_offer(offer, name).await,
            Message::Answer { answer, name } => {
                if self.is_foreign("answer", name.as_deref()) {
                    Ok(())
                } else {
                    self.on_answer(answer).await
                }
            }
            Message::Candidate { candidate, name } => {
                if self.is_foreign("candidate", name.as_deref()) {
                    Ok(())
                } else {
                    self.on_candidate(candidate).await
                }
            }
            Message::Leave { name } => {
                if !self.is_foreign("leave", name.as_deref()) {
                    self.on_leave().await;
                }
                Ok(())
            }
            Message::Unknown => Ok(()),
        };
        if let Err(e) = result {
            log::warn!("failed to handle inbound message: {}", e);
        }
    }

    async fn on_login(&mut self, success: bool) {
        if !success {
            log::warn!("login as '{}' rejected", self.session.local_name());
            self.notify(CallEvent::LoginRejected);
            self.alert(LOGIN_REJECTED);
            return;
        }
        log::info!("logged in as '{}'", self.session.local_name());
        self.notify(CallEvent::LoggedIn);
        if let Some(current) = self.session.peer_name().map(str::to_owned) {
            // registered again mid-call: the call does not survive it
            self.leave_current(&current);
            self.reset_call().await;
        } else if self.peer.is_none() {
            self.start_connection().await;
        }
    }

    /// Acquires local media and arms the first peer adapter.
    async fn start_connection(&mut self) {
        match self.media_source.acquire().await {
            Ok(media) => {
                self.media = Some(media);
                self.arm().await;
            }
            Err(e) => {
                log::error!("no local media: {}", e);
                self.alert(&format!("Sorry, no media devices are available: {}", e));
            }
        }
    }

    async fn on_offer(
        &mut self,
        offer: RTCSessionDescription,
        name: Option<String>,
    ) -> Result<(), Error> {
        let Some(caller) = name else {
            log::warn!("ignoring offer without a caller name");
            return Ok(());
        };
        if let Some(current) = self.session.peer_name().map(str::to_owned) {
            if current != caller {
                match self.offer_policy {
                    OfferPolicy::RejectWhileBusy => {
                        log::info!("busy with '{}', rejecting call from '{}'", current, caller);
                        return self.transmit(Message::Leave { name: Some(caller) });
                    }
                    OfferPolicy::Replace => {
                        log::info!("call from '{}' replaces call with '{}'", caller, current);
                        self.leave_current(&current);
                        self.reset_call().await;
                    }
                }
            }
        }
        if self.peer.is_none() {
            return Err(Error::NotConnected);
        }
        log::info!("incoming call from '{}'", caller);
        self.set_peer(Some(&caller));
        let result = match &self.peer {
            Some(adapter) => adapter.accept_offer(offer).await,
            None => Err(Error::NotConnected),
        };
        match result {
            Ok(answer) => self.send(Message::answer(answer)),
            Err(e) => {
                self.negotiation_failed(e);
                Ok(())
            }
        }
    }

    async fn on_answer(&mut self, answer: RTCSessionDescription) -> Result<(), Error> {
        let result = match &self.peer {
            Some(adapter) => adapter.accept_answer(answer).await,
            None => return Err(Error::NotConnected),
        };
        if let Err(e) = result {
            self.negotiation_failed(e);
        }
        Ok(())
    }

    async fn on_candidate(&mut self, candidate: RTCIceCandidateInit) -> Result<(), Error> {
        match &self.peer {
            Some(adapter) => adapter.add_ice_candidate(candidate).await,
            None => Err(Error::NotConnected),
        }
    }

    async fn on_leave(&mut self) {
        log::info!("peer '{}' left", self.session.peer_name().unwrap_or_default());
        self.reset_call().await;
    }

    /// Clears the peer and the remote output, then closes the adapter and arms a fresh one
    /// with the same local media.
    async fn reset_call(&mut self) {
        self.set_peer(None);
        self.remote_stream = None;
        self.notify(CallEvent::RemoteStream(None));
        self.arm().await;
    }

    async fn arm(&mut self) {
        self.disarm().await;
        let Some(media) = self.media.clone() else {
            return;
        };
        self.generation += 1;
        let events = PeerEvents::new(self.generation, self.peer_events_tx.clone());
        match self.connector.connect(&media, events).await {
            Ok(adapter) => {
                log::debug!("peer connection #{} ready", self.generation);
                self.peer = Some(adapter);
            }
            Err(e) => {
                log::error!("failed to create peer connection: {}", e);
                self.alert(&format!("Sorry, peer connections are not supported: {}", e));
            }
        }
    }

    async fn disarm(&mut self) {
        if let Some(adapter) = self.peer.take() {
            self.generation += 1;
            if let Err(e) = adapter.close().await {
                log::warn!("failed to close peer connection: {}", e);
            }
        }
    }

    pub async fn handle_peer_event(&mut self, tagged: TaggedPeerEvent) {
        if tagged.generation != self.generation || self.peer.is_none() {
            log::debug!(
                "discarding event of peer connection #{}: {:?}",
                tagged.generation,
                tagged.event
            );
            return;
        }
        match tagged.event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(e) = self.send(Message::candidate(candidate)) {
                    log::warn!("failed to send local candidate: {}", e);
                }
            }
            PeerEvent::RemoteTrack(track) => {
                log::info!("remote {} track '{}' arrived", track.kind, track.id);
                self.remote_stream = Some(track.clone());
                self.notify(CallEvent::RemoteStream(Some(track)));
            }
            PeerEvent::Connected => {
                if self.session.set_connected(true) {
                    self.notify(CallEvent::StateChanged(self.session.state()));
                }
            }
            PeerEvent::Disconnected => {
                if self.session.set_connected(false) {
                    self.notify(CallEvent::StateChanged(self.session.state()));
                }
            }
            PeerEvent::Failed(e) => self.negotiation_failed(e),
            PeerEvent::DataChannelOpen { label, remote } => {
                log::debug!("data channel '{}' open", label);
                if !remote {
                    let greeting = format!("{} has connected.", self.session.local_name());
                    if let Some(adapter) = &self.peer {
                        if let Err(e) = adapter.send_text(greeting).await {
                            log::warn!("failed to greet over data channel '{}': {}", label, e);
                        }
                    }
                }
            }
            PeerEvent::DataChannelMessage { label, data } => {
                let text = String::from_utf8_lossy(&data).into_owned();
                log::debug!("got data channel '{}' message: {}", label, text);
                self.notify(CallEvent::Received(text));
            }
            PeerEvent::DataChannelError { label, error } => {
                log::warn!("data channel '{}' error: {}", label, error);
            }
            PeerEvent::DataChannelClosed { label } => {
                log::info!("data channel '{}' closed", label);
            }
        }
    }

    fn set_peer(&mut self, peer: Option<&str>) {
        if self.session.set_peer(peer) {
            self.notify(CallEvent::PeerChanged(peer.map(str::to_owned)));
            self.notify(CallEvent::StateChanged(self.session.state()));
        }
    }

    /// Tells `current` that we are leaving. Failures are only logged.
    fn leave_current(&self, current: &str) {
        if let Err(e) = self.send(Message::leave()) {
            log::warn!("failed to notify '{}': {}", current, e);
        }
    }

    /// Whether an inbound message of `kind` comes from someone other than the current peer.
    /// Messages without a sender name are trusted.
    fn is_foreign(&self, kind: &str, sender: Option<&str>) -> bool {
        match sender {
            Some(sender) if self.session.peer_name() != Some(sender) => {
                log::warn!(
                    "ignoring {} from '{}', current peer is {:?}",
                    kind,
                    sender,
                    self.session.peer_name()
                );
                true
            }
            _ => false,
        }
    }

    /// Sends a message addressed to the current peer, if any.
    fn send(&self, mut msg: Message) -> Result<(), Error> {
        msg.stamp(self.session.peer_name());
        self.transmit(msg)
    }

    fn transmit(&self, msg: Message) -> Result<(), Error> {
        log::debug!("sending {} message to {:?}", msg.kind(), msg.name());
        self.signaling.send(msg).map_err(|_| Error::ChannelClosed)
    }

    fn negotiation_failed(&self, e: Error) {
        log::error!("negotiation failed: {}", e);
        self.alert(&format!("An error has occurred: {}", e));
    }

    fn alert(&self, text: &str) {
        self.notify(CallEvent::Alert(text.to_owned()));
    }

    fn notify(&self, event: CallEvent) {
        // nobody watching the UI is not an error
        let _ = self.ui.send(event);
    }
}
