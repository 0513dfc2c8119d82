#![allow(dead_code)]

use async_trait::async_trait;
use pairlink_lib::error::{RegistrationError, SignalingError, TransportError};
use pairlink_lib::peer::{
    IceCandidateRecord, LocalMedia, LocalTrack, MediaTransport, Role, SdpType,
    SessionDescriptionRecord, TransportEvents, TransportFactory,
};
use pairlink_lib::room::{PeerId, RoomClient, RoomId};
use pairlink_lib::signaling::{ChannelConnector, SignalingChannel};
use pairlink_lib::{Session, SessionError};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const OFFER_SDP: &str = "offer-sdp";
pub const ANSWER_SDP: &str = "answer-sdp";
/// Remote descriptions carrying this SDP are rejected by the fake transport.
pub const REJECTED_SDP: &str = "reject-me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(Option<String>),
    AddCandidate(String),
    CloseTransport,
    PushDescription(SdpType),
    PushCandidate(String),
    OpenChannel,
}

/// Every fake writes into the same journal so cross-component order shows.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn record(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.0.lock().iter().filter(|c| *c == call).count()
    }

    pub fn contains(&self, call: &Call) -> bool {
        self.count(call) > 0
    }

    /// Journal without track attachment and channel bookkeeping.
    pub fn negotiation(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::AddTrack(_) | Call::OpenChannel))
            .collect()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }
}

/// Suspends one call of a fake until the test releases it.
#[derive(Default)]
pub struct Pause {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Pause {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the armed call is suspended.
    pub async fn reached(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn hold(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

pub struct FakeTransport {
    journal: Journal,
    set_local_pause: Arc<Pause>,
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescriptionRecord, TransportError> {
        self.journal.record(Call::CreateOffer);
        Ok(SessionDescriptionRecord::new(SdpType::Offer, OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescriptionRecord, TransportError> {
        self.journal.record(Call::CreateAnswer);
        Ok(SessionDescriptionRecord::new(SdpType::Answer, ANSWER_SDP))
    }

    async fn set_local_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError> {
        self.journal.record(Call::SetLocal(description.kind));
        self.set_local_pause.hold().await;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescriptionRecord,
    ) -> Result<(), TransportError> {
        if description.sdp.as_deref() == Some(REJECTED_SDP) {
            return Err(TransportError::DescriptionRejected("malformed sdp".into()));
        }
        tokio::task::yield_now().await;
        self.journal.record(Call::SetRemote(description.sdp));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateRecord) -> Result<(), TransportError> {
        self.journal.record(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn add_local_track(&self, track: &LocalTrack) -> Result<(), TransportError> {
        self.journal.record(Call::AddTrack(track.track_id.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.journal.record(Call::CloseTransport);
        Ok(())
    }
}

pub struct FakeTransportFactory {
    journal: Journal,
    fail: AtomicBool,
    events: Mutex<Option<TransportEvents>>,
    pub create_pause: Pause,
    pub set_local_pause: Arc<Pause>,
}

impl FakeTransportFactory {
    /// Sender the latest transport reports its events through.
    pub fn events(&self) -> TransportEvents {
        self.events.lock().clone().expect("no transport created yet")
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        events: TransportEvents,
    ) -> Result<Arc<dyn MediaTransport>, TransportError> {
        self.create_pause.hold().await;
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Acquisition("no media engine".into()));
        }
        *self.events.lock() = Some(events);
        Ok(Arc::new(FakeTransport {
            journal: self.journal.clone(),
            set_local_pause: Arc::clone(&self.set_local_pause),
        }))
    }
}

pub struct FakeRoomClient {
    journal: Journal,
    fail_pushes: AtomicBool,
    pub push_pause: Pause,
}

impl FakeRoomClient {
    pub fn fail_pushes(&self) {
        self.fail_pushes.store(true, Ordering::SeqCst);
    }

    fn push_result(&self) -> Result<(), RegistrationError> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(RegistrationError::Rpc {
                status: 404,
                code: "not_found".into(),
                message: "peer not found".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoomClient for FakeRoomClient {
    async fn create_room(&self) -> Result<RoomId, RegistrationError> {
        Ok("room-1".into())
    }

    async fn join_room(&self, _room_id: &str) -> Result<PeerId, RegistrationError> {
        Ok("peer-1".into())
    }

    async fn push_description(
        &self,
        _room_id: &str,
        _peer_id: &str,
        description: &SessionDescriptionRecord,
    ) -> Result<(), RegistrationError> {
        self.push_result()?;
        self.journal.record(Call::PushDescription(description.kind));
        self.push_pause.hold().await;
        Ok(())
    }

    async fn push_candidate(
        &self,
        _room_id: &str,
        _peer_id: &str,
        candidate: &IceCandidateRecord,
    ) -> Result<(), RegistrationError> {
        self.push_result()?;
        self.journal.record(Call::PushCandidate(candidate.candidate.clone()));
        Ok(())
    }
}

pub struct FakeConnector {
    journal: Journal,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pub open_pause: Pause,
}

impl FakeConnector {
    /// Server side of the most recently opened channel.
    pub fn server(&self) -> mpsc::UnboundedSender<String> {
        self.sender.lock().clone().expect("no channel opened yet")
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn open(&self, _room_id: &str, _peer_id: &str) -> Result<SignalingChannel, SignalingError> {
        self.journal.record(Call::OpenChannel);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        self.open_pause.hold().await;
        Ok(SignalingChannel::new(rx))
    }
}

pub struct Harness {
    pub journal: Journal,
    pub transports: Arc<FakeTransportFactory>,
    pub rooms: Arc<FakeRoomClient>,
    pub channels: Arc<FakeConnector>,
    pub idle_calls: Arc<AtomicUsize>,
    pub session: Session,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let transports = Arc::new(FakeTransportFactory {
            journal: journal.clone(),
            fail: AtomicBool::new(false),
            events: Mutex::new(None),
            create_pause: Pause::default(),
            set_local_pause: Arc::default(),
        });
        let rooms = Arc::new(FakeRoomClient {
            journal: journal.clone(),
            fail_pushes: AtomicBool::new(false),
            push_pause: Pause::default(),
        });
        let channels = Arc::new(FakeConnector {
            journal: journal.clone(),
            sender: Mutex::new(None),
            open_pause: Pause::default(),
        });
        let idle_calls = Arc::new(AtomicUsize::new(0));
        let session = Session::new(
            transports.clone(),
            rooms.clone(),
            channels.clone(),
            {
                let idle_calls = idle_calls.clone();
                Arc::new(move || {
                    idle_calls.fetch_add(1, Ordering::SeqCst);
                })
            },
        );
        Self {
            journal,
            transports,
            rooms,
            channels,
            idle_calls,
            session,
        }
    }

    pub async fn start(&self, role: Role) {
        self.session
            .start("room-1", "peer-1", role, &LocalMedia::audio_video("test"))
            .await
            .expect("session should start");
    }

    /// Runs `start` on its own task so the test can act while it is suspended.
    pub fn spawn_start(&self, role: Role) -> tokio::task::JoinHandle<Result<(), SessionError>> {
        let session = self.session.clone();
        tokio::spawn(async move {
            session
                .start("room-1", "peer-1", role, &LocalMedia::audio_video("test"))
                .await
        })
    }

    /// Calls recorded after the transport was closed.
    pub fn calls_after_close(&self) -> Vec<Call> {
        self.journal
            .calls()
            .into_iter()
            .skip_while(|c| *c != Call::CloseTransport)
            .skip(1)
            .collect()
    }

    pub fn send(&self, frame: String) {
        self.channels.server().send(frame).expect("channel closed");
    }

    pub fn idle_calls(&self) -> usize {
        self.idle_calls.load(Ordering::SeqCst)
    }
}

pub fn description_frame(sdp: &str, kind: SdpType) -> String {
    json!({"message": "description", "description": {"sdp": sdp, "type": kind.code()}}).to_string()
}

fn candidate_json(candidate: &str) -> serde_json::Value {
    json!({"candidate": candidate, "sdpMLineIndex": "0", "sdpMid": "0", "usernameFragment": ""})
}

pub fn candidate_frame(candidate: &str) -> String {
    json!({"message": "candidate", "candidate": candidate_json(candidate)}).to_string()
}

pub fn batch_frame(candidates: &[&str]) -> String {
    let candidates: Vec<_> = candidates.iter().map(|c| candidate_json(c)).collect();
    json!({"message": "candidates", "candidates": candidates}).to_string()
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives spawned tasks a chance to run before checking that nothing happened.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
