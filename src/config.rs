use crate::error::Error;
use serde::Deserialize;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:8888";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.1.google.com:19302";
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "myLabel";

/// What to do with an incoming offer while another call is in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPolicy {
    /// Hang up on the current peer (sending it a `leave`) and accept the new caller.
    #[default]
    Replace,
    /// Keep the current call and answer the new caller with a `leave`.
    RejectWhileBusy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    pub signaling_url: String,
    pub ice_servers: Vec<String>,
    pub data_channel_label: String,
    pub offer_policy: OfferPolicy,
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_ice_servers(mut self, urls: &[&str]) -> Self {
        self.ice_servers = urls.iter().map(|&url| url.to_owned()).collect();
        self
    }

    pub fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            signaling_url: DEFAULT_SIGNALING_URL.to_owned(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_owned()],
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_owned(),
            offer_policy: OfferPolicy::default(),
        }
    }
}
