use crate::error::Error;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

pub const LOCAL_STREAM_ID: &str = "local-stream";

/// Local audio/video tracks attached to every peer connection of a session. Cloning is cheap:
/// clones share the same tracks, so a re-armed peer connection keeps sending the same media.
#[derive(Clone, Default)]
pub struct LocalMedia {
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>) -> Self {
        LocalMedia { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn TrackLocal + Send + Sync>] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl std::fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tracks.iter().map(|t| (t.kind(), t.id().to_owned())))
            .finish()
    }
}

/// User media capture.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquires the local media. Fails with [Error::MediaUnavailable] when no capture device
    /// can be used.
    async fn acquire(&self) -> Result<LocalMedia, Error>;
}

/// Media source backed by an Opus audio track and a VP8 video track. The application writes
/// encoded samples into the tracks returned by [SampleMedia::audio] and [SampleMedia::video].
#[derive(Clone)]
pub struct SampleMedia {
    audio: Arc<TrackLocalStaticSample>,
    video: Arc<TrackLocalStaticSample>,
}

impl SampleMedia {
    pub fn new() -> Self {
        let audio = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            LOCAL_STREAM_ID.to_owned(),
        );
        let video = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            LOCAL_STREAM_ID.to_owned(),
        );
        SampleMedia {
            audio: Arc::new(audio),
            video: Arc::new(video),
        }
    }

    pub fn audio(&self) -> &Arc<TrackLocalStaticSample> {
        &self.audio
    }

    pub fn video(&self) -> &Arc<TrackLocalStaticSample> {
        &self.video
    }
}

impl Default for SampleMedia {
    fn default() -> Self {
        SampleMedia::new()
    }
}

#[async_trait]
impl MediaSource for SampleMedia {
    async fn acquire(&self) -> Result<LocalMedia, Error> {
        Ok(LocalMedia::new(vec![
            self.audio.clone() as Arc<dyn TrackLocal + Send + Sync>,
            self.video.clone() as Arc<dyn TrackLocal + Send + Sync>,
        ]))
    }
}
