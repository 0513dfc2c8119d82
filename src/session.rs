//! Signaling session: drives offer/answer and ICE trickling between the
//! room service, the signaling channel and the media transport.
//!
//! Per lifetime (`start` .. `stop`) three tasks run:
//! - the dispatch task reads the signaling channel and handles events one
//!   at a time,
//! - the candidate task applies remote candidates in arrival order once the
//!   remote description gate opens,
//! - the transport task forwards local candidates to the room service and
//!   watches connectivity.

use crate::error::SessionError;
use crate::logger::dump_candidate;
use crate::peer::ice::{analyze_candidates, apply_candidates, CandidateQueue, RemoteDescriptionGate};
use crate::peer::state::{Lifetime, Role, SessionPhase, SessionState};
use crate::peer::transport::{
    ConnectivityState, LocalMedia, MediaTransport, RemoteTrack, TransportEvent, TransportFactory,
};
use crate::peer::types::{IceCandidateRecord, SdpType, SessionDescriptionRecord, SignalingEvent};
use crate::room::RoomClient;
use crate::signaling::{ChannelConnector, SignalingChannel};
use crate::utils::random_id;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// "Return to idle" capability, invoked once when the peer is lost.
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

pub type RemoteTrackCallback = Arc<dyn Fn(RemoteTrack) + Send + Sync>;

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    transports: Arc<dyn TransportFactory>,
    rooms: Arc<dyn RoomClient>,
    channels: Arc<dyn ChannelConnector>,
    on_idle: IdleCallback,
    on_remote_track: Mutex<Option<RemoteTrackCallback>>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        transports: Arc<dyn TransportFactory>,
        rooms: Arc<dyn RoomClient>,
        channels: Arc<dyn ChannelConnector>,
        on_idle: IdleCallback,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transports,
                rooms,
                channels,
                on_idle,
                on_remote_track: Mutex::new(None),
                state: Mutex::new(SessionState::new()),
            }),
        }
    }

    pub fn on_remote_track(&self, callback: RemoteTrackCallback) {
        *self.inner.on_remote_track.lock() = Some(callback);
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    /// Starts a new lifetime. Legal from `Idle` and `Closed`.
    ///
    /// Acquires the transport, attaches `media`, and opens the signaling
    /// channel. A `Caller` generates and pushes its offer before the channel
    /// is opened. Any failure tears the lifetime down again and is returned.
    /// A `stop` that lands while this is suspended wins: nothing further is
    /// pushed or opened and `Stopped` is returned.
    pub async fn start(
        &self,
        room_id: &str,
        peer_id: &str,
        role: Role,
        media: &LocalMedia,
    ) -> Result<(), SessionError> {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.phase.is_active() || state.lifetime.is_some() {
                return Err(SessionError::AlreadyActive);
            }
            state.generation += 1;
            state.phase = SessionPhase::Negotiating;
            state.generation
        };

        let id = random_id();
        let span = info_span!("session", %id, room = %room_id, peer = %peer_id, ?role);
        let result = self
            .launch(generation, id, room_id, peer_id, role, media)
            .instrument(span)
            .await;

        if let Err(err) = result {
            let stopped = {
                let state = self.inner.state.lock();
                state.generation != generation || state.phase == SessionPhase::Closed
            };
            if stopped {
                return Err(SessionError::Stopped);
            }
            warn!(error = %err, room = %room_id, "session failed to start");
            self.teardown(Some(generation)).await;
            return Err(err);
        }
        Ok(())
    }

    /// Releases the channel and the transport and moves to `Closed`. Safe to
    /// call in any phase, any number of times.
    pub async fn stop(&self) {
        self.teardown(None).await;
    }

    async fn launch(
        &self,
        generation: u64,
        id: String,
        room_id: &str,
        peer_id: &str,
        role: Role,
        media: &LocalMedia,
    ) -> Result<(), SessionError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = self.inner.transports.create(events_tx).await?;

        let adopted = {
            let mut state = self.inner.state.lock();
            let current = state.generation == generation && state.phase == SessionPhase::Negotiating;
            if current {
                state.lifetime = Some(Lifetime {
                    id,
                    transport: Arc::clone(&transport),
                    tasks: Vec::new(),
                });
            }
            current
        };
        if !adopted {
            close_transport(transport.as_ref()).await;
            return Err(SessionError::Stopped);
        }

        self.attach_task(
            generation,
            tokio::spawn(
                watch_transport(
                    Arc::downgrade(&self.inner),
                    generation,
                    room_id.to_owned(),
                    peer_id.to_owned(),
                    events_rx,
                )
                .in_current_span(),
            ),
        )?;

        for track in &media.tracks {
            self.ensure_current(generation)?;
            transport.add_local_track(track).await?;
        }
        self.ensure_current(generation)?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let gate = RemoteDescriptionGate::new();
        self.attach_task(
            generation,
            tokio::spawn(
                apply_candidates(gate.clone(), Arc::clone(&transport), queue_rx).in_current_span(),
            ),
        )?;

        let negotiation = Arc::new(Negotiation {
            role,
            room_id: room_id.to_owned(),
            peer_id: peer_id.to_owned(),
            transport,
            rooms: Arc::clone(&self.inner.rooms),
            gate,
            remote_claimed: AtomicBool::new(false),
            candidates: queue_tx,
        });

        if role == Role::Caller {
            let offer = negotiation.local_offer().await?;
            self.ensure_current(generation)?;
            negotiation.push_description(&offer).await?;
            debug!("offer pushed");
        }

        self.ensure_current(generation)?;
        let channel = self.inner.channels.open(room_id, peer_id).await?;
        self.attach_task(
            generation,
            tokio::spawn(dispatch(channel, negotiation).in_current_span()),
        )?;

        info!("session started");
        Ok(())
    }

    /// Fails with `Stopped` once `stop` has released this lifetime.
    fn ensure_current(&self, generation: u64) -> Result<(), SessionError> {
        if self.inner.state.lock().is_current(generation) {
            Ok(())
        } else {
            Err(SessionError::Stopped)
        }
    }

    /// Hands a task to the running lifetime, or aborts it if that lifetime
    /// has already been stopped.
    fn attach_task(&self, generation: u64, task: JoinHandle<()>) -> Result<(), SessionError> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        match state.lifetime.as_mut() {
            Some(lifetime) if state.generation == generation => {
                lifetime.tasks.push(task);
                Ok(())
            }
            _ => {
                task.abort();
                Err(SessionError::Stopped)
            }
        }
    }

    /// Tears down the running lifetime. With `Some(generation)` only that
    /// lifetime is torn down.
    async fn teardown(&self, generation: Option<u64>) {
        let lifetime = {
            let mut state = self.inner.state.lock();
            if generation.is_some_and(|g| g != state.generation) {
                return;
            }
            state.phase = SessionPhase::Closed;
            state.lifetime.take()
        };

        let Some(lifetime) = lifetime else {
            debug!("stop: nothing to release");
            return;
        };

        for task in &lifetime.tasks {
            task.abort();
        }
        for task in lifetime.tasks {
            let _ = task.await;
        }
        close_transport(lifetime.transport.as_ref()).await;
        info!(id = %lifetime.id, "session stopped");
    }

    /// Returns true when this change moved the session to `Connected`.
    fn on_connectivity_change(&self, generation: u64, connectivity: ConnectivityState) -> bool {
        if connectivity.is_connected() {
            let mut state = self.inner.state.lock();
            if state.is_current(generation) && state.phase == SessionPhase::Negotiating {
                state.phase = SessionPhase::Connected;
                info!("peer connected");
                return true;
            }
            return false;
        }

        if !connectivity.is_terminal() {
            debug!(state = ?connectivity, "connectivity changed");
            return false;
        }

        let lost = {
            let mut state = self.inner.state.lock();
            if state.is_current(generation) && state.phase.is_active() {
                state.phase = SessionPhase::Disconnected;
                true
            } else {
                false
            }
        };

        if lost {
            warn!(state = ?connectivity, "peer lost, returning to idle");
            (self.inner.on_idle)();
            let session = self.clone();
            tokio::spawn(async move {
                session.teardown(Some(generation)).await;
            });
        }
        false
    }
}

async fn close_transport(transport: &dyn MediaTransport) {
    if let Err(err) = transport.close().await {
        warn!(error = %err, "failed to close media transport");
    }
}

/// Forwards transport events until the transport goes away.
async fn watch_transport(
    inner: Weak<Inner>,
    generation: u64,
    room_id: String,
    peer_id: String,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut gathered: Vec<IceCandidateRecord> = Vec::new();

    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                dump_candidate("LOCAL", &candidate);
                if let Err(err) = inner
                    .rooms
                    .push_candidate(&room_id, &peer_id, &candidate)
                    .await
                {
                    warn!(error = %err, "failed to push local candidate");
                }
                gathered.push(candidate);
            }
            TransportEvent::RemoteTrack(track) => {
                info!(track_id = %track.track_id, stream_id = %track.stream_id, kind = ?track.kind, "remote track");
                let callback = inner.on_remote_track.lock().clone();
                if let Some(callback) = callback {
                    callback(track);
                }
            }
            TransportEvent::Connectivity(connectivity) => {
                if (Session { inner }).on_connectivity_change(generation, connectivity) {
                    analyze_candidates(&gathered);
                }
            }
        }
    }
    debug!("transport events ended");
}

/// Reads the channel and dispatches events strictly one after another.
async fn dispatch(mut channel: SignalingChannel, negotiation: Arc<Negotiation>) {
    while let Some(frame) = channel.next_frame().await {
        match SignalingEvent::decode(&frame) {
            Ok(event) => negotiation.handle(event).await,
            Err(err) => warn!(error = %err, "dropping malformed signaling event"),
        }
    }
    info!("signaling channel ended");
}

/// Per-lifetime negotiation context shared by the dispatch task.
struct Negotiation {
    role: Role,
    room_id: String,
    peer_id: String,
    transport: Arc<dyn MediaTransport>,
    rooms: Arc<dyn RoomClient>,
    gate: RemoteDescriptionGate,
    /// Set while a remote description is applied or being applied.
    remote_claimed: AtomicBool,
    candidates: CandidateQueue,
}

impl Negotiation {
    async fn handle(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::Description(description) => match self.role {
                Role::Caller => self.accept_answer(description).await,
                Role::Callee => self.accept_offer(description).await,
            },
            SignalingEvent::Candidate(candidate) => {
                self.queue_candidates(vec![candidate]);
            }
            SignalingEvent::CandidatesBatch(batch) => {
                self.queue_candidates(batch);
            }
            SignalingEvent::Unknown => debug!("ignoring unknown signaling event"),
        }
    }

    /// Returns false when the applier is gone and the batch was dropped.
    fn queue_candidates(&self, batch: Vec<IceCandidateRecord>) -> bool {
        if !self.gate.is_open() {
            debug!(count = batch.len(), "remote description not set yet, queuing candidates");
        }
        match self.candidates.send(batch) {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                debug!(count = dropped.len(), "candidate applier stopped, dropping candidates");
                false
            }
        }
    }

    fn claim_remote(&self) -> bool {
        !self.remote_claimed.swap(true, Ordering::SeqCst)
    }

    fn release_remote(&self) {
        self.remote_claimed.store(false, Ordering::SeqCst);
    }

    /// Creates the offer and applies it locally. Pushing is left to the
    /// caller so it can check the lifetime first.
    async fn local_offer(&self) -> Result<SessionDescriptionRecord, SessionError> {
        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn push_description(
        &self,
        description: &SessionDescriptionRecord,
    ) -> Result<(), SessionError> {
        self.rooms
            .push_description(&self.room_id, &self.peer_id, description)
            .await?;
        Ok(())
    }

    async fn send_answer(&self) -> Result<(), SessionError> {
        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        self.push_description(&answer).await?;
        debug!("answer pushed");
        Ok(())
    }

    async fn accept_answer(&self, answer: SessionDescriptionRecord) {
        if !self.claim_remote() {
            debug!("remote description already set, ignoring description");
            return;
        }
        if !matches!(answer.kind, SdpType::Answer | SdpType::Pranswer) {
            warn!(kind = ?answer.kind, "caller received a description that is not an answer");
        }

        match self.transport.set_remote_description(answer).await {
            Ok(()) => {
                info!("answer applied");
                self.gate.open();
            }
            Err(err) => {
                warn!(error = %err, "failed to apply answer");
                self.release_remote();
            }
        }
    }

    async fn accept_offer(&self, offer: SessionDescriptionRecord) {
        if !self.claim_remote() {
            debug!("offer already handled, ignoring description");
            return;
        }
        if offer.kind != SdpType::Offer {
            warn!(kind = ?offer.kind, "callee received a description that is not an offer");
        }

        if let Err(err) = self.transport.set_remote_description(offer).await {
            warn!(error = %err, "failed to apply offer");
            self.release_remote();
            return;
        }
        info!("offer applied");

        if let Err(err) = self.send_answer().await {
            warn!(error = %err, "failed to answer offer");
        }
        self.gate.open();
    }
}
