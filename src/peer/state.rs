use crate::peer::transport::MediaTransport;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Which side of the offer/answer exchange this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Creates the offer and waits for the answer.
    Caller,
    /// Waits for the offer and replies with an answer.
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Negotiating,
    Connected,
    Disconnected,
    Closed,
}

impl SessionPhase {
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Negotiating | SessionPhase::Connected)
    }
}

/// Mutable core of a session. `generation` increases with every `start`, so
/// work belonging to an older lifetime can recognise itself as stale.
pub struct SessionState {
    pub phase: SessionPhase,
    pub generation: u64,
    pub lifetime: Option<Lifetime>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            generation: 0,
            lifetime: None,
        }
    }

    /// True while `generation` is the running lifetime.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.lifetime.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Resources owned by one start/stop cycle. The signaling channel lives
/// inside the dispatch task, so aborting that task releases it.
pub struct Lifetime {
    pub id: String,
    pub transport: Arc<dyn MediaTransport>,
    pub tasks: Vec<JoinHandle<()>>,
}
