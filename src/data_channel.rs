use crate::adapter::{PeerEvent, PeerEvents};
use crate::error::Error;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::Notify;
use webrtc::data_channel::RTCDataChannel;

/// Labeled data channel. Lifecycle changes and incoming messages are forwarded to the owning
/// peer connection's event queue.
pub struct DataChannel {
    dc: Arc<RTCDataChannel>,
    status: Arc<ArcSwap<DataChannelState>>,
    remote: bool,
}

impl DataChannel {
    /// Wraps a channel. `remote` marks channels created by the other side of the connection.
    pub fn new(dc: Arc<RTCDataChannel>, remote: bool, events: PeerEvents) -> Self {
        let label = dc.label().to_owned();
        let status = Arc::new(ArcSwap::new(DataChannelState::waiting()));

        let s = Arc::downgrade(&status);
        let tx = events.clone();
        let l = label.clone();
        dc.on_open(Box::new(move || {
            let s = s.clone();
            let tx = tx.clone();
            let l = l.clone();
            Box::pin(async move {
                if let Some(status) = s.upgrade() {
                    status.rcu(|old| match &**old {
                        DataChannelState::Waiting { ready } => {
                            ready.notify_waiters();
                            DataChannelState::open()
                        }
                        _ => old.clone(),
                    });
                }
                tx.emit(PeerEvent::DataChannelOpen { label: l, remote });
            })
        }));

        let s = Arc::downgrade(&status);
        let tx = events.clone();
        let l = label.clone();
        dc.on_close(Box::new(move || {
            let s = s.clone();
            let tx = tx.clone();
            let label = l.clone();
            Box::pin(async move {
                if let Some(status) = s.upgrade() {
                    DataChannelState::close(&status, None);
                }
                tx.emit(PeerEvent::DataChannelClosed { label });
            })
        }));

        let s = Arc::downgrade(&status);
        let tx = events.clone();
        let l = label.clone();
        dc.on_error(Box::new(move |e| {
            let s = s.clone();
            let tx = tx.clone();
            let label = l.clone();
            Box::pin(async move {
                let error: Error = e.into();
                if let Some(status) = s.upgrade() {
                    DataChannelState::close(&status, Some(error.clone()));
                }
                tx.emit(PeerEvent::DataChannelError { label, error });
            })
        }));

        let tx = events;
        let l = label;
        dc.on_message(Box::new(move |msg| {
            let tx = tx.clone();
            let label = l.clone();
            Box::pin(async move {
                tx.emit(PeerEvent::DataChannelMessage {
                    label,
                    data: msg.data,
                });
            })
        }));

        DataChannel { dc, status, remote }
    }

    pub fn label(&self) -> &str {
        self.dc.label()
    }

    pub fn is_open(&self) -> bool {
        self.status.load().is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.load().is_closed()
    }

    /// Waits until the data channel is ready to operate.
    ///
    /// # Returns
    ///
    /// If channel has been opened successfully, this method returns `Ok(true)`.
    /// If channel has been closed gracefully it returns `Ok(false)`.
    /// If channel has been closed due to failure it returns `Err`.
    pub async fn ready(&self) -> Result<bool, Error> {
        loop {
            let status = self.status.load_full();
            match &*status {
                DataChannelState::Open => return Ok(true),
                DataChannelState::Closed { reason: None } => return Ok(false),
                DataChannelState::Closed { reason: Some(e) } => return Err(e.clone()),
                DataChannelState::Waiting { ready } => {
                    let notified = ready.notified();
                    // the state may have changed before we subscribed
                    if self.status.load().is_waiting() {
                        notified.await;
                    }
                }
            }
        }
    }

    /// Sends a text message. The channel must already be open.
    pub async fn send_text(&self, text: String) -> Result<(), Error> {
        match &**self.status.load() {
            DataChannelState::Open => {
                self.dc.send_text(text).await?;
                Ok(())
            }
            DataChannelState::Waiting { .. } => Err(Error::NotConnected),
            DataChannelState::Closed { reason } => {
                Err(reason.clone().unwrap_or(Error::ChannelClosed))
            }
        }
    }

    pub async fn close(&self) -> Result<(), Error> {
        let old = self.status.swap(DataChannelState::closed_gracefully());
        match &*old {
            DataChannelState::Waiting { ready } => ready.notify_waiters(),
            DataChannelState::Open => {}
            DataChannelState::Closed { .. } => return Ok(()),
        }
        self.dc.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannel")
            .field("label", &self.dc.label())
            .field("remote", &self.remote)
            .field("state", &self.status)
            .finish()
    }
}

impl AsRef<RTCDataChannel> for DataChannel {
    fn as_ref(&self) -> &RTCDataChannel {
        &self.dc
    }
}

#[derive(Debug)]
enum DataChannelState {
    /// Underlying data channel is waiting to become open.
    Waiting {
        /// Notifier used when the underlying data channel leaves the waiting state.
        ready: Notify,
    },
    /// Underlying data channel is open and ready to send/receive messages.
    Open,
    /// Underlying data channel has already been closed.
    Closed {
        /// Optional error reason, why the channel has been closed.
        reason: Option<Error>,
    },
}

impl DataChannelState {
    fn waiting() -> Arc<Self> {
        Arc::new(DataChannelState::Waiting {
            ready: Notify::new(),
        })
    }

    fn open() -> Arc<Self> {
        Arc::new(DataChannelState::Open)
    }

    fn closed_gracefully() -> Arc<Self> {
        Arc::new(DataChannelState::Closed { reason: None })
    }

    fn failed(reason: Error) -> Arc<Self> {
        Arc::new(DataChannelState::Closed {
            reason: Some(reason),
        })
    }

    /// Moves `status` into the closed state and wakes up pending `ready` calls. A failure
    /// reason already recorded is never replaced by a graceful close.
    fn close(status: &ArcSwap<Self>, reason: Option<Error>) {
        let old = status.rcu(|old| match (&**old, &reason) {
            (DataChannelState::Closed { reason: Some(_) }, _) => old.clone(),
            (DataChannelState::Closed { reason: None }, None) => old.clone(),
            (_, Some(e)) => DataChannelState::failed(e.clone()),
            (_, None) => DataChannelState::closed_gracefully(),
        });
        if let DataChannelState::Waiting { ready } = &*old {
            ready.notify_waiters();
        }
    }

    fn is_waiting(&self) -> bool {
        matches!(self, DataChannelState::Waiting { .. })
    }

    fn is_open(&self) -> bool {
        matches!(self, DataChannelState::Open)
    }

    fn is_closed(&self) -> bool {
        matches!(self, DataChannelState::Closed { .. })
    }
}
