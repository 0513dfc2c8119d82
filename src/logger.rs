use crate::peer::types::IceCandidateRecord;
use tracing::{debug, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Installs the global subscriber. `RUST_LOG` wins over the build default.
pub fn init() {
    let default_level = if crate::config::LOGGING_ENABLED {
        "pairlink=debug,pairlink_lib=debug,info"
    } else {
        "warn"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(true)
        .try_init();
}

/// Trace an ICE candidate as it trickles in either direction.
pub fn dump_candidate(label: &str, cand: &IceCandidateRecord) {
    debug!(
        label,
        candidate = %cand.candidate,
        sdp_mid = ?cand.sdp_mid,
        sdp_mline_index = ?cand.sdp_mline_index,
        username_fragment = ?cand.username_fragment,
        "trickle"
    );
}

/// Quick getStats snapshot of the nominated candidate pair.
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                info!(
                    moment,
                    local = %pair.local_candidate_id,
                    remote = %pair.remote_candidate_id,
                    bytes_sent = pair.bytes_sent,
                    bytes_received = pair.bytes_received,
                    state = ?pair.state,
                    "selected candidate pair"
                );
            }
        }
    }
}
