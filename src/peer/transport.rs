use crate::error::TransportError;
use crate::peer::types::{IceCandidateRecord, SessionDescriptionRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Describes a local track to publish. Samples are supplied by whoever owns
/// the capture device, not by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub kind: MediaKind,
    pub track_id: String,
    pub stream_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMedia {
    pub tracks: Vec<LocalTrack>,
}

impl LocalMedia {
    /// One audio and one video track sharing a stream id.
    pub fn audio_video(stream_id: &str) -> Self {
        Self {
            tracks: vec![
                LocalTrack {
                    kind: MediaKind::Audio,
                    track_id: "audio".into(),
                    stream_id: stream_id.into(),
                },
                LocalTrack {
                    kind: MediaKind::Video,
                    track_id: "video".into(),
                    stream_id: stream_id.into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub kind: Option<MediaKind>,
    pub track_id: String,
    pub stream_id: String,
}

/// Connectivity as reported by the transport (peer connection or ICE layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    New,
    Checking,
    Connecting,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// States that end a session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectivityState::Disconnected | ConnectivityState::Failed | ConnectivityState::Closed
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectivityState::Connected | ConnectivityState::Completed)
    }
}

/// Everything the transport emits on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidateRecord),
    Connectivity(ConnectivityState),
    RemoteTrack(RemoteTrack),
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Media transport engine driven by the session.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescriptionRecord, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescriptionRecord, TransportError>;

    async fn set_local_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateRecord) -> Result<(), TransportError>;

    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates one transport per session lifetime. The transport reports its
/// events through `events` until it is closed.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        events: TransportEvents,
    ) -> Result<Arc<dyn MediaTransport>, TransportError>;
}
