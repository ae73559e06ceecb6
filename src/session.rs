/// Progress of the current call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No peer selected.
    #[default]
    Idle,
    /// A peer is selected and the peer connection is being negotiated.
    Negotiating,
    /// The peer connection reported an established transport.
    Connected,
}

/// In-memory state of a signaling session: who we are and who we are talking to.
#[derive(Debug, Clone, Default)]
pub struct Session {
    local_name: String,
    peer_name: Option<String>,
    state: ConnectionState,
}

impl Session {
    /// Identity registered at login. Empty until a login request was made.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.peer_name.is_some()
    }

    pub(crate) fn set_local_name(&mut self, name: &str) {
        self.local_name = name.to_owned();
    }

    /// Selects the remote party, or clears it with `None`. Returns true if anything changed.
    pub(crate) fn set_peer(&mut self, peer: Option<&str>) -> bool {
        if self.peer_name.as_deref() == peer {
            return false;
        }
        self.peer_name = peer.map(str::to_owned);
        self.state = if self.peer_name.is_some() {
            ConnectionState::Negotiating
        } else {
            ConnectionState::Idle
        };
        true
    }

    /// Records a transport change. Ignored while idle.
    pub(crate) fn set_connected(&mut self, connected: bool) -> bool {
        if self.peer_name.is_none() {
            return false;
        }
        let state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Negotiating
        };
        let changed = self.state != state;
        self.state = state;
        changed
    }
}
