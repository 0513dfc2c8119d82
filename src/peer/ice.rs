use crate::logger::dump_candidate;
use crate::peer::transport::MediaTransport;
use crate::peer::types::IceCandidateRecord;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// One-shot signal that the remote description of the current lifetime has
/// been applied. A fresh gate is created for every lifetime.
#[derive(Clone, Debug)]
pub struct RemoteDescriptionGate {
    tx: Arc<watch::Sender<bool>>,
}

impl RemoteDescriptionGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `open` has been called (immediately if it already was).
    pub async fn opened(&self) {
        let mut rx = self.tx.subscribe();
        // Sender is owned by `self`; wait_for cannot see it dropped.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for RemoteDescriptionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote candidates in arrival order, one entry per signaling event.
pub type CandidateQueue = mpsc::UnboundedSender<Vec<IceCandidateRecord>>;

/// Waits for the gate, then hands queued candidates to the transport in the
/// order they were queued. Failures are logged and skipped.
pub async fn apply_candidates(
    gate: RemoteDescriptionGate,
    transport: Arc<dyn MediaTransport>,
    mut queue: mpsc::UnboundedReceiver<Vec<IceCandidateRecord>>,
) {
    gate.opened().await;
    debug!("remote description applied, releasing remote candidates");

    while let Some(batch) = queue.recv().await {
        for candidate in batch {
            dump_candidate("REMOTE", &candidate);
            if let Err(err) = transport.add_ice_candidate(candidate).await {
                warn!(error = %err, "failed to apply remote candidate");
            }
        }
    }
}

/// Logs how many host, srflx and relay candidates were gathered.
pub fn analyze_candidates(candidates: &[IceCandidateRecord]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    info!(host_count, srflx_count, relay_count, "local candidate analysis");

    if relay_count == 0 {
        warn!("no TURN relay candidates gathered, connection through NAT may fail");
    }
}
