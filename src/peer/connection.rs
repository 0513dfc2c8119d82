use crate::error::TransportError;
use crate::logger::dump_selected_pair;
use crate::peer::transport::{
    ConnectivityState, LocalTrack, MediaKind, MediaTransport, RemoteTrack, TransportEvent,
    TransportEvents, TransportFactory,
};
use crate::peer::types::{IceCandidateRecord, SdpType, ServerConfig, SessionDescriptionRecord};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds webrtc-rs peer connections for sessions.
pub struct RtcTransportFactory {
    ice_servers: Vec<ServerConfig>,
}

impl RtcTransportFactory {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        events: TransportEvents,
    ) -> Result<Arc<dyn MediaTransport>, TransportError> {
        let transport = new_peer(&self.ice_servers, events).await?;
        Ok(Arc::new(transport))
    }
}

/// A webrtc-rs peer connection.
pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
}

/// Creates the peer connection and wires its callbacks into `events`.
pub async fn new_peer(
    ice_servers: &[ServerConfig],
    events: TransportEvents,
) -> Result<RtcTransport, TransportError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().map_err(acquisition)?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine).map_err(acquisition)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(
        api.new_peer_connection(rtc_config(ice_servers))
            .await
            .map_err(acquisition)?,
    );

    let candidate_events = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand.map(|c| c.to_json()) {
            Some(Ok(init)) => {
                let _ = candidate_events.send(TransportEvent::LocalCandidate(candidate_from_rtc(init)));
            }
            Some(Err(err)) => warn!(error = %err, "failed to serialize local candidate"),
            None => debug!("ICE candidate gathering completed"),
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!(?state, "ICE gathering state changed");
        Box::pin(async {})
    }));

    let state_events = events.clone();
    let pc_stats: Weak<RTCPeerConnection> = Arc::downgrade(&pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        info!(state = ?st, "peer connection state changed");

        if matches!(st, RTCPeerConnectionState::Connected | RTCPeerConnectionState::Failed) {
            if let Some(pc) = pc_stats.upgrade() {
                let moment = if st == RTCPeerConnectionState::Connected {
                    "CONNECTED"
                } else {
                    "BEFORE-FAIL"
                };
                tokio::spawn(async move {
                    dump_selected_pair(&pc, moment).await;
                });
            }
        }

        if let Some(state) = connectivity_from_peer_state(st) {
            let _ = state_events.send(TransportEvent::Connectivity(state));
        }
        Box::pin(async {})
    }));

    let ice_events = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
        debug!(state = ?st, "ICE connection state changed");
        if let Some(state) = connectivity_from_ice_state(st) {
            let _ = ice_events.send(TransportEvent::Connectivity(state));
        }
        Box::pin(async {})
    }));

    let track_events = events;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(MediaKind::Audio),
                RTPCodecType::Video => Some(MediaKind::Video),
                _ => None,
            };
            let _ = track_events.send(TransportEvent::RemoteTrack(RemoteTrack {
                kind,
                track_id: track.id(),
                stream_id: track.stream_id(),
            }));
            Box::pin(async {})
        },
    ));

    Ok(RtcTransport { pc })
}

#[async_trait]
impl MediaTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescriptionRecord, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|err| TransportError::Negotiation(err.to_string()))?;
        Ok(description_from_rtc(offer))
    }

    async fn create_answer(&self) -> Result<SessionDescriptionRecord, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|err| TransportError::Negotiation(err.to_string()))?;
        Ok(description_from_rtc(answer))
    }

    async fn set_local_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError> {
        self.pc
            .set_local_description(description_to_rtc(description)?)
            .await
            .map_err(|err| TransportError::DescriptionRejected(err.to_string()))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(description_to_rtc(description)?)
            .await
            .map_err(|err| TransportError::DescriptionRejected(err.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateRecord) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(candidate_to_rtc(candidate))
            .await
            .map_err(|err| TransportError::Candidate(err.to_string()))
    }

    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_for(track.kind),
            track.track_id.clone(),
            track.stream_id.clone(),
        ));
        let sender = self
            .pc
            .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|err| TransportError::Track(err.to_string()))?;

        // RTCP has to be drained for the interceptors to run.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        debug!(track_id = %track.track_id, kind = ?track.kind, "local track attached");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|err| TransportError::Closed(err.to_string()))
    }
}

fn acquisition(err: webrtc::Error) -> TransportError {
    TransportError::Acquisition(err.to_string())
}

/// Peer connection configuration
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    let ice_servers = servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn codec_for(kind: MediaKind) -> RTCRtpCodecCapability {
    match kind {
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
    }
}

fn connectivity_from_peer_state(state: RTCPeerConnectionState) -> Option<ConnectivityState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectivityState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectivityState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectivityState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectivityState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectivityState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn connectivity_from_ice_state(state: RTCIceConnectionState) -> Option<ConnectivityState> {
    match state {
        RTCIceConnectionState::New => Some(ConnectivityState::New),
        RTCIceConnectionState::Checking => Some(ConnectivityState::Checking),
        RTCIceConnectionState::Connected => Some(ConnectivityState::Connected),
        RTCIceConnectionState::Completed => Some(ConnectivityState::Completed),
        RTCIceConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
        RTCIceConnectionState::Failed => Some(ConnectivityState::Failed),
        RTCIceConnectionState::Closed => Some(ConnectivityState::Closed),
        RTCIceConnectionState::Unspecified => None,
    }
}

fn sdp_type_to_rtc(kind: SdpType) -> RTCSdpType {
    match kind {
        SdpType::Unspecified => RTCSdpType::Unspecified,
        SdpType::Offer => RTCSdpType::Offer,
        SdpType::Answer => RTCSdpType::Answer,
        SdpType::Pranswer => RTCSdpType::Pranswer,
        SdpType::Rollback => RTCSdpType::Rollback,
    }
}

fn sdp_type_from_rtc(kind: RTCSdpType) -> SdpType {
    match kind {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => SdpType::Unspecified,
    }
}

fn description_from_rtc(description: RTCSessionDescription) -> SessionDescriptionRecord {
    SessionDescriptionRecord::new(sdp_type_from_rtc(description.sdp_type), description.sdp)
}

fn description_to_rtc(
    record: SessionDescriptionRecord,
) -> Result<RTCSessionDescription, TransportError> {
    let sdp = record.sdp.unwrap_or_default();
    let parsed = match record.kind {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback | SdpType::Unspecified => {
            let mut description = RTCSessionDescription::default();
            description.sdp_type = sdp_type_to_rtc(record.kind);
            description.sdp = sdp;
            return Ok(description);
        }
    };
    parsed.map_err(|err| TransportError::DescriptionRejected(err.to_string()))
}

fn candidate_from_rtc(init: RTCIceCandidateInit) -> IceCandidateRecord {
    IceCandidateRecord {
        candidate: init.candidate,
        sdp_mline_index: init.sdp_mline_index,
        sdp_mid: init.sdp_mid.filter(|v| !v.is_empty()),
        username_fragment: init.username_fragment.filter(|v| !v.is_empty()),
    }
}

fn candidate_to_rtc(record: IceCandidateRecord) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: record.candidate,
        sdp_mid: record.sdp_mid,
        sdp_mline_index: record.sdp_mline_index,
        username_fragment: record.username_fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn candidates_convert_both_ways() {
        let record = IceCandidateRecord {
            candidate: "candidate:1 1 udp 1 10.0.0.1 9 typ host".into(),
            sdp_mline_index: Some(0),
            sdp_mid: Some("0".into()),
            username_fragment: None,
        };
        assert_eq!(candidate_from_rtc(candidate_to_rtc(record.clone())), record);
    }

    #[test]
    fn empty_rtc_fields_become_absent() {
        let record = candidate_from_rtc(RTCIceCandidateInit {
            candidate: "c".into(),
            sdp_mid: Some(String::new()),
            sdp_mline_index: None,
            username_fragment: Some(String::new()),
        });
        assert_eq!(record.sdp_mid, None);
        assert_eq!(record.username_fragment, None);
    }

    #[test]
    fn rollback_skips_sdp_parsing() {
        let description = description_to_rtc(SessionDescriptionRecord {
            sdp: None,
            kind: SdpType::Rollback,
        })
        .unwrap();
        assert_eq!(description.sdp_type, RTCSdpType::Rollback);
        assert!(description.sdp.is_empty());
    }

    #[test]
    fn sdp_types_map_one_to_one() {
        for kind in [
            SdpType::Unspecified,
            SdpType::Offer,
            SdpType::Answer,
            SdpType::Pranswer,
            SdpType::Rollback,
        ] {
            assert_eq!(sdp_type_from_rtc(sdp_type_to_rtc(kind)), kind);
        }
    }

    #[test]
    fn config_keeps_bundle_policy_and_schemes() {
        let config = rtc_config(&[ServerConfig {
            id: "s".into(),
            r#type: "stun".into(),
            url: "stun.example.org:3478".into(),
            username: None,
            credential: None,
        }]);
        assert_eq!(config.ice_servers[0].urls, ["stun:stun.example.org:3478"]);
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
        assert_eq!(config.rtcp_mux_policy, RTCRtcpMuxPolicy::Require);
    }

    #[tokio::test]
    async fn offer_lists_local_tracks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = new_peer(&[], tx).await.unwrap();
        for track in crate::peer::transport::LocalMedia::audio_video("test").tracks {
            transport.add_local_track(&track).await.unwrap();
        }
        let offer = transport.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpType::Offer);
        let sdp = offer.sdp.clone().unwrap();
        assert_eq!(sdp.matches("m=audio").count(), 1);
        assert_eq!(sdp.matches("m=video").count(), 1);
        assert!(sdp.contains("opus/48000/2"));
        assert!(sdp.contains("VP8/90000"));

        transport.set_local_description(offer).await.unwrap();
        transport.close().await.unwrap();
    }
}
